use std::path::Path;

use form_parts::{ByteArrayPart, Error, Form, StreamPart};
use http::Request;
use log::{debug, error, info};

#[tokio::main]
async fn main() {
    dotenv::dotenv().expect("Failed to initialize dotenv");
    pretty_env_logger::init();

    let upload_url = std::env::var("UPLOAD_URL").expect("UPLOAD_URL must be set");
    let upload_file = std::env::var("UPLOAD_FILE").expect("UPLOAD_FILE must be set");

    if let Err(e) = upload(&upload_url, Path::new(&upload_file)).await {
        error!("Upload failed: {}", e);
    }
}

async fn upload(url: &str, path: &Path) -> Result<(), Error> {
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("upload.bin")
        .to_owned();

    let file = tokio::fs::File::open(path).await?;
    let part = StreamPart::from_file(file, file_name)
        .await?
        .with_name("file")
        .with_content_type("application/octet-stream")
        .with_progress(|percent| debug!("Uploaded {:.2}%", percent));

    let description = ByteArrayPart::new("Uploaded by the form_parts demo", "description.txt")?
        .with_name("description")
        .with_content_type("text/plain; charset=utf-8");

    let form = Form::new().part(description).part(part);
    debug!("Posting form with boundary {}", form.boundary());

    let request = form.into_request(Request::post(url))?;
    let response = hyper::Client::new().request(request).await?;

    info!("Server answered {}", response.status());
    Ok(())
}
