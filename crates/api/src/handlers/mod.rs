pub mod comfyui;
pub mod queue;
