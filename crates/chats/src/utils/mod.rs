//! Internal utilities shared by the engines.

pub mod drawing;
pub mod resolve;
pub mod validation;

pub use drawing::{decode_drawing, drawing_object_path, DecodedDrawing};
pub use resolve::{resolve_messages, with_replies};
pub use validation::{emoji_or_default, non_blank};
