//! CORS and request tracing layers applied to every route.

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Permissive CORS for local development; a production deployment would
/// restrict this to known origins.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::permissive()
}

pub fn trace_layer() -> TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
}
