//! Representative-frame PNG thumbnails for Lottie animations.
//!
//! An animation (plain JSON or a ZIP bundle with its image assets) is rendered at its middle
//! frame through an ordered cascade of strategies:
//!
//! 1. a headless browser running the web player (feature `browser`),
//! 2. the in-process player hosted by an emulated DOM,
//! 3. a static composite of the background and the first image layer,
//! 4. a procedural placeholder, which cannot fail.
//!
//! The first strategy that yields a PNG wins. Start from [`generate_thumbnail`] for files, or
//! [`render_pipeline`] for an already parsed [`AnimationDocument`].
#![forbid(unsafe_code)]

mod foundation;

pub mod bridge;
pub mod bundle;
pub mod capture;
pub mod cascade;
pub mod composite;
pub mod config;
pub mod decode;
pub mod document;
pub mod engine;
pub mod frame;
pub mod locator;
pub mod placeholder;
pub mod request;
pub mod strategy;
pub mod thumbnail;

pub use crate::foundation::core::{Canvas, FrameIndex, Rgba8};
pub use crate::foundation::error::{ThumbError, ThumbResult};

pub use crate::cascade::{Attempt, CascadeOutcome, run_cascade};
pub use crate::config::ThumbnailConfig;
pub use crate::document::AnimationDocument;
pub use crate::frame::select_middle_frame;
pub use crate::placeholder::MINIMAL_PNG;
pub use crate::request::{RenderRequest, ThumbnailMetadata, ThumbnailResult};
pub use crate::strategy::{Capabilities, RenderStrategy, StrategyKind};
pub use crate::thumbnail::{
    MetadataSink, ThumbnailJob, generate_thumbnail, render_pipeline, render_request,
};
