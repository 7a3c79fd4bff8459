pub mod comfyui;
pub mod health;
