use thiserror::Error;

/// Convenient result alias for the evroute library.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Raised when a station id or name could not be resolved.
    #[error("unknown station: {name}{}", format_suggestions(.suggestions))]
    UnknownStation {
        name: String,
        suggestions: Vec<String>,
    },

    /// Raised when inserting a node whose id is already present in the graph.
    #[error("node id '{id}' already exists in graph")]
    DuplicateNode { id: String },

    /// Raised when a node id is not part of the graph.
    #[error("node id '{id}' is not part of the graph")]
    UnknownNode { id: String },

    /// Raised when no route could be found between two nodes.
    #[error("no route found between {start} and {goal}")]
    RouteNotFound { start: String, goal: String },

    /// Raised when a route or polyline has no usable points.
    #[error("route was empty")]
    EmptyRoute,

    /// Raised when vehicle or planner parameters fail validation.
    #[error("invalid vehicle parameters: {message}")]
    InvalidVehicle { message: String },

    /// Raised when station data fails validation.
    #[error("invalid station data: {message}")]
    StationData { message: String },

    /// Raised when two stations share the same explicit identifier.
    #[error("duplicate station id encountered: {id}")]
    DuplicateStation { id: String },

    /// Raised when an endpoint could not be resolved to a station or coordinate.
    #[error("cannot resolve endpoint '{input}' to a station or coordinate")]
    UnresolvedEndpoint { input: String },

    /// Raised when the road-routing service returned an unusable response.
    #[error("road router error: {message}")]
    RoadRouter { message: String },

    /// Raised when the geocoding service returned an unusable response.
    #[error("geocoder error: {message}")]
    Geocoder { message: String },

    /// Wrapper for IO errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Wrapper for HTTP client errors.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Wrapper for JSON (de)serialization errors.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else if suggestions.len() == 1 {
        format!(". Did you mean '{}'?", suggestions[0])
    } else {
        format!(
            ". Did you mean one of: {}?",
            suggestions
                .iter()
                .map(|s| format!("'{}'", s))
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}
