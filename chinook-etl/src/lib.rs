//! chinook-etl library - sales extraction and reporting pipeline
//!
//! Data flows one way: [`source`] → [`aggregate`] → [`rank`] (top-N reports
//! only) → [`sink`], driven report by report by [`orchestrator`].

pub mod aggregate;
pub mod db;
pub mod model;
pub mod orchestrator;
pub mod rank;
pub mod sink;
pub mod source;

pub use aggregate::{AggregationStrategy, ClientSide, QuerySide};
pub use model::{AggregateRow, Dimension, GenreTrackCount, SaleLineItem, TimeBucket};
pub use orchestrator::{Orchestrator, PipelineEvent, PipelineRun, RunState};
pub use source::{Filter, SourceReader, SourceRequest};
