use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use image::ImageFormat;
use slug::slugify;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

const NOT_AN_IMAGE: &str = "Please upload a valid image (JPEG, PNG, GIF or WebP).";

/// A file part received from the post form.
#[derive(Clone)]
pub struct ImageUpload {
    /// Client-side filename, possibly with a directory component.
    pub file_name: String,
    pub bytes: Bytes,
}

impl fmt::Debug for ImageUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageUpload")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Raster formats accepted for post images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl ImageKind {
    /// Sniffs the leading bytes. The client's filename and declared type
    /// are never consulted.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        match image::guess_format(bytes).ok()? {
            ImageFormat::Jpeg => Some(ImageKind::Jpeg),
            ImageFormat::Png => Some(ImageKind::Png),
            ImageFormat::Gif => Some(ImageKind::Gif),
            ImageFormat::WebP => Some(ImageKind::WebP),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            ImageKind::Png => "png",
            ImageKind::Gif => "gif",
            ImageKind::WebP => "webp",
        }
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("The uploaded file is not a supported image.")]
    NotAnImage,
    #[error("A file named \"{0}\" already exists.")]
    Collision(String),
    #[error("Could not store the file \"{name}\": {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Post images on disk, addressed by filename only.
///
/// Every stored file gets a fresh name of the form `{slug}-{token}.{ext}`
/// and is created exclusively, so an existing image is never overwritten.
/// `ext` always comes from the detected format.
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub async fn new(dir: PathBuf) -> anyhow::Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Image storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Writes the upload under a new unique name and returns that name.
    pub async fn store(&self, upload: &ImageUpload) -> Result<String, UploadError> {
        let kind = ImageKind::detect(&upload.bytes).ok_or(UploadError::NotAnImage)?;
        let name = stored_name(&upload.file_name, kind);
        let path = self.path_of(&name);

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(UploadError::Collision(name));
            }
            Err(source) => return Err(UploadError::Io { name, source }),
        };

        let written = async {
            file.write_all(&upload.bytes).await?;
            file.flush().await
        }
        .await;

        if let Err(source) = written {
            drop(file);
            if let Err(e) = fs::remove_file(&path).await {
                warn!("Failed to remove partial upload {}: {}", path.display(), e);
            }
            return Err(UploadError::Io { name, source });
        }

        info!(
            "Stored image {} ({} bytes, from \"{}\")",
            name,
            upload.bytes.len(),
            upload.file_name
        );
        Ok(name)
    }
}

/// `{slug}-{token}.{ext}` for a client filename and detected format.
pub fn stored_name(file_name: &str, kind: ImageKind) -> String {
    let slug = slugify(base_name(file_name));
    let slug = if slug.is_empty() { "image".to_string() } else { slug };
    let token = Uuid::new_v4().simple();
    format!("{slug}-{token}.{}", kind.extension())
}

/// Filename without directory or extension.
fn base_name(file_name: &str) -> &str {
    let name = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// Form-level checks for an image part; the message is shown next to the field.
pub fn validate_image(upload: &ImageUpload, max_bytes: usize) -> Result<(), String> {
    if upload.bytes.len() > max_bytes {
        return Err(format!(
            "The file is too large. Allowed maximum size is {max_bytes} bytes."
        ));
    }
    if ImageKind::detect(&upload.bytes).is_none() {
        return Err(NOT_AN_IMAGE.to_string());
    }
    Ok(())
}
