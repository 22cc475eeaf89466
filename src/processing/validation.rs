//! Upload filename validation

use std::io;

use crate::error::{Result, FastConvertError};

/// Reduce a client-declared filename to a single safe path component
///
/// Browsers and multipart clients may send directory prefixes with either
/// separator; only the final component is kept so every artifact lands
/// directly inside the upload directory.
pub fn sanitize_filename(declared: &str) -> Result<String> {
    let name = declared
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let blank = name.trim();

    if blank.is_empty() || blank == "." || blank == ".." || name.contains('\0') {
        return Err(FastConvertError::io(
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid upload filename: {:?}", declared),
            ),
            None,
        ));
    }

    Ok(name.to_string())
}
