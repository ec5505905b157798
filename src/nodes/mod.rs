//! Generator node capabilities and input aggregation.
//!
//! Each generator kind (image, video, upscale) knows which inputs it needs
//! and how to turn them into a back-end request payload.

mod image;
mod inputs;
mod registry;
mod types;
mod upscale;
mod video;

pub use image::ImageGenerator;
pub use inputs::{connected_inputs, ConnectedInputs};
pub use registry::GeneratorRegistry;
pub use types::Generator;
pub use upscale::UpscaleGenerator;
pub use video::VideoGenerator;
