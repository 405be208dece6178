mod instances;
mod staging;
mod wgpu_backend;

pub use instances::{
    build_entity_instances, build_tile_instances, DrawBatch, EntityInstance, FrameInstances,
    TileInstance,
};
pub use staging::{align_up, BufferCursor, StagingError};
pub use wgpu_backend::Renderer;
