//! Search backend: criteria translation, wire model and HTTP client

pub mod client;
pub mod http;
pub mod model;
pub mod translator;

pub use client::SearchClient;
pub use http::HttpSearchClient;
pub use model::{SearchHit, SearchHits, SearchRequest, SearchResponse, TermsBucket, WriteResult};
pub use translator::{
    translate_search_error, SearchTranslator, DEFAULT_MAX_RESULT_WINDOW, MAX_UPDATE_SIZE, SEARCH_WILDCARD,
    UNBOUNDED_SIZE,
};
