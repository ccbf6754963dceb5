//! Prints the banner service OpenAPI document as JSON.
//!
//! Usage:
//!   cargo run -p banner-api --bin generate-openapi > openapi.json

use banner_api::ApiDoc;

fn main() {
    match ApiDoc::to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Failed to serialize OpenAPI spec: {}", e);
            std::process::exit(1);
        }
    }
}
