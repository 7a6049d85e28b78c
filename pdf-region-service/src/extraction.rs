//! Batch region extraction pipeline.
//!
//! A batch names one source PDF and a list of regions, each on some page, in
//! normalized coordinates. The pipeline fetches the document once, renders
//! each referenced page once, cuts every region out as a PNG with a white
//! margin, and reports one result per region under a single wall-clock budget.

pub mod batch;
pub mod coordinates;
pub mod crop;
pub mod deadline;
pub mod grouping;
pub mod render;
pub mod results;
pub mod types;

pub use batch::BatchOrchestrator;
pub use types::{
    ExtractionRequest, ExtractionResponse, ExtractionResult, FailureCode, PNG_MIME_TYPE, PixelRect,
};
