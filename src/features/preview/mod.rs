mod assets;
mod composer;
pub mod document;
mod font;
pub mod handler;
pub mod layout;
mod metadata;
pub mod renderer;
mod service;
pub mod types;

pub use composer::{build_preview_document, owner_caption};
pub use font::FontLoader;
pub use handler::{create_preview_router, og_image_url};
pub use metadata::{LIST_NOT_FOUND, MetadataClient, public_list_endpoint};
pub use service::PreviewService;
pub use types::{
    CANVAS_HEIGHT, CANVAS_WIDTH, DEFAULT_OWNER_NAME, DEFAULT_TITLE, ListMetadata, OutputImage,
    PreviewQuery,
};
