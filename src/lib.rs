//! Multipart/form-data request bodies for hyper.
//!
//! Parts come in three kinds: [`ByteArrayPart`] for in-memory buffers,
//! [`FileInfoPart`] for files opened when the part is converted, and
//! [`StreamPart`] for async readers, written in chunks with optional
//! progress reporting. A [`Form`] joins them into one body.
//!
//! ```no_run
//! use form_parts::{ByteArrayPart, Form, StreamPart};
//!
//! # async fn upload(file: tokio::fs::File) -> Result<(), form_parts::Error> {
//! let avatar = StreamPart::from_file(file, "avatar.png")
//!     .await?
//!     .with_name("avatar")
//!     .with_content_type("image/png")
//!     .with_progress(|percent| println!("{:.1}%", percent));
//!
//! let request = Form::new()
//!     .part(ByteArrayPart::new("jane", "user.txt")?.with_name("user"))
//!     .part(avatar)
//!     .into_request(http::Request::post("http://localhost/profile"))?;
//! # drop(request);
//! # Ok(())
//! # }
//! ```

mod error;
pub use error::Error;

mod config;
pub use config::{ChunkConfig, ProgressMode, DEFAULT_CHUNK_SIZE};

mod content;
pub use content::Content;

mod form;
pub use form::Form;

mod part;
pub use part::{ByteArrayPart, FileInfoPart, MultipartItem, PartMeta, StreamPart};

mod progress;
pub use progress::ProgressFn;
