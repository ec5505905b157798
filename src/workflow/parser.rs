//! Graph document parser (JSON or YAML).

use std::path::Path;

use super::types::Graph;
use crate::error::{Error, Result};

/// Parse a graph from a JSON string.
pub fn parse_graph(json: &str) -> Result<Graph> {
    if json.trim().is_empty() {
        return Err(Error::Parse("Empty graph document".to_string()));
    }

    serde_json::from_str(json).map_err(|e| describe_error(&e.to_string(), "JSON"))
}

/// Parse a graph from a YAML string.
pub fn parse_graph_yaml(yaml: &str) -> Result<Graph> {
    if yaml.trim().is_empty() {
        return Err(Error::Parse("Empty graph document".to_string()));
    }

    serde_yaml::from_str(yaml).map_err(|e| describe_error(&e.to_string(), "YAML"))
}

/// Parse a graph from a file path. `.yaml`/`.yml` files are read as YAML,
/// everything else as JSON.
pub fn parse_graph_file(path: &Path) -> Result<Graph> {
    let content = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => parse_graph_yaml(&content),
        _ => parse_graph(&content),
    }
}

fn describe_error(msg: &str, format: &str) -> Error {
    if let Some(field) = extract_missing_field(msg) {
        Error::Parse(format!("Missing required field: {}", field))
    } else {
        Error::Parse(format!("Invalid {}: {}", format, msg))
    }
}

fn extract_missing_field(error_message: &str) -> Option<&str> {
    let marker = "missing field `";
    let start = error_message.find(marker)? + marker.len();
    let rest = &error_message[start..];
    let end = rest.find('`')?;
    Some(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::GeneratorKind;
    use std::io::Write;

    #[test]
    fn test_parse_json_graph() {
        let json = r#"{
            "nodes": [
                { "id": "p", "type": "prompt", "text": "a red fox" },
                { "id": "img", "type": "image", "model": "flux" },
                { "id": "out", "type": "output" }
            ],
            "edges": [
                { "id": "e1", "source": "p", "target": "img" },
                { "id": "e2", "source": "img", "target": "out" }
            ]
        }"#;

        let graph = parse_graph(json).unwrap();
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.edges[1].target, "out");
        assert_eq!(
            graph.get_node("img").unwrap().kind.generator_kind(),
            Some(GeneratorKind::Image)
        );
    }

    #[test]
    fn test_parse_yaml_graph() {
        let yaml = r#"
nodes:
  - id: p
    type: prompt
    text: neon city
    negative_prompt: blurry
  - id: vid
    type: video
    settings:
      duration: 5
edges:
  - source: p
    target: vid
"#;

        let graph = parse_graph_yaml(yaml).unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges[0].source, "p");
    }

    #[test]
    fn test_missing_field_is_reported() {
        let json = r#"{ "nodes": [ { "type": "prompt" } ] }"#;
        let err = parse_graph(json).unwrap_err();
        assert!(err.to_string().contains("Missing required field: id"), "{}", err);
    }

    #[test]
    fn test_unknown_node_type_fails() {
        let json = r#"{ "nodes": [ { "id": "x", "type": "hologram" } ] }"#;
        assert!(matches!(parse_graph(json), Err(Error::Parse(_))));
    }

    #[test]
    fn test_empty_document() {
        assert!(parse_graph("   ").is_err());
        assert!(parse_graph_yaml("").is_err());
    }

    #[test]
    fn test_parse_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "nodes:\n  - id: a\n    type: upscale\nedges: []").unwrap();

        let graph = parse_graph_file(&path).unwrap();
        assert_eq!(graph.generator_ids(), vec!["a"]);
    }
}
