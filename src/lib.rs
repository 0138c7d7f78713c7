//! Fileconv - batch and pipeline file conversion
//!
//! Converts and compresses media, PDFs, office documents, e-books and
//! structured text by driving external tools (ffmpeg, ghostscript, qpdf,
//! LibreOffice, calibre) or native code, with deterministic output naming,
//! upfront conflict checks and one overall progress figure per job.

pub mod backend;
pub mod batch;
pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod output_path;
pub mod pipeline;
pub mod progress;
pub mod status;
