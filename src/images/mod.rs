mod services;

pub use services::{ImageError, ImageStore, UploadedFile};
