pub mod secure_headers_middleware;
