// Access logging, compression and CORS.

use actix_cors::Cors;
use actix_web::http::header;
use actix_web::middleware::{Compress, Logger};

pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

pub fn setup_middleware() -> (Logger, Compress) {
    let logger = Logger::new("%a \"%r\" %s %b %Dms");
    let compress = Compress::default();
    (logger, compress)
}

/// CORS for a comma-separated origin list; `*` allows any origin.
pub fn setup_cors(allowed_origins: &str) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
        .expose_headers(vec![header::RETRY_AFTER, header::CONTENT_DISPOSITION])
        .max_age(3600);

    for origin in allowed_origins
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
    {
        if origin == "*" {
            return cors.allow_any_origin();
        }
        cors = cors.allowed_origin(origin);
    }

    cors
}
