use std::{fmt, fs, io, path::Path, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Extensions offered by the file picker. Advisory only; the service decides
/// what it accepts.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// The image currently chosen for upload.
#[derive(Clone, PartialEq, Eq)]
pub struct Selection {
    file_name: String,
    mime_type: String,
    bytes: Arc<[u8]>,
}

impl Selection {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        let file_name = file_name.into();
        let mime_type = mime_guess::from_path(&file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self {
            file_name,
            mime_type,
            bytes: bytes.into(),
        }
    }

    pub fn from_path(path: &Path) -> io::Result<Self> {
        let bytes = fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::new(file_name, bytes))
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn has_accepted_extension(&self) -> bool {
        Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                ACCEPTED_EXTENSIONS
                    .iter()
                    .any(|accepted| ext.eq_ignore_ascii_case(accepted))
            })
            .unwrap_or(false)
    }

    /// `data:` URI over the selected bytes, usable as a local preview source.
    pub fn preview_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            STANDARD.encode(&self.bytes)
        )
    }
}

impl fmt::Debug for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selection")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("size_bytes", &self.bytes.len())
            .finish()
    }
}
