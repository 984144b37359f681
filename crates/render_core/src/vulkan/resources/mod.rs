//! GPU memory, buffers, images and textures

pub mod buffer;
pub mod image;
pub mod memory;
pub mod texture;

pub use buffer::{copy_buffer, BufferResource};
pub use self::image::{copy_buffer_to_image, ImageResource, ImageSpec, ImageView};
pub use memory::find_memory_type;
pub use texture::{PixelData, Texture, TextureKey, TextureRegistry};
