//! Print the OpenAPI document of the server as pretty JSON.

use hitline_back::services::documentation::ApiDoc;
use utoipa::OpenApi;

fn main() -> anyhow::Result<()> {
    let doc = ApiDoc::openapi().to_pretty_json()?;
    println!("{doc}");
    Ok(())
}
