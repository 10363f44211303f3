use std::io::Cursor;

use anyhow::Context;
use bytes::Bytes;
use image::{imageops::FilterType, ImageFormat};
use lazy_static::lazy_static;
use regex::Regex;

use crate::errors::AccountError;

pub const MAX_AVATAR_BYTES: usize = 1_000_000;
pub const AVATAR_SIDE: u32 = 250;

lazy_static! {
    static ref ALLOWED_NAME_RE: Regex = Regex::new(r"\.(jpg|jpeg|png)$").unwrap();
}

/// Rejects uploads by file name and size before any decoding happens.
pub fn check_upload(file_name: Option<&str>, len: usize) -> Result<(), AccountError> {
    let allowed = file_name.map(|n| ALLOWED_NAME_RE.is_match(n)).unwrap_or(false);
    if !allowed {
        return Err(AccountError::UploadRejected("Upload a jpg, jpeg or png only".into()));
    }
    if len > MAX_AVATAR_BYTES {
        return Err(AccountError::UploadRejected("File too large".into()));
    }
    Ok(())
}

/// Decodes any supported image and re-encodes it as a 250x250 PNG.
pub async fn normalize_avatar(body: Bytes) -> Result<Vec<u8>, AccountError> {
    tokio::task::spawn_blocking(move || -> Result<Vec<u8>, AccountError> {
        let img = image::load_from_memory(&body)
            .map_err(|_| AccountError::UploadRejected("Upload a valid image".into()))?;
        let resized = img.resize_to_fill(AVATAR_SIDE, AVATAR_SIDE, FilterType::Lanczos3);
        let mut out = Cursor::new(Vec::new());
        resized
            .write_to(&mut out, ImageFormat::Png)
            .context("encode avatar png")?;
        Ok(out.into_inner())
    })
    .await
    .context("avatar worker")?
}

#[cfg(test)]
pub(crate) mod testing {
    use std::io::Cursor;

    use image::{ImageFormat, Rgb, RgbImage};

    pub fn sample_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).expect("encode sample");
        out.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::sample_image;
    use super::*;

    #[test]
    fn only_jpg_jpeg_png_names_pass() {
        for ok in ["me.jpg", "me.jpeg", "photo.final.png"] {
            assert!(check_upload(Some(ok), 10).is_ok(), "{ok}");
        }
        for bad in ["me.gif", "me.png.exe", "me", "me.PNG"] {
            assert!(check_upload(Some(bad), 10).is_err(), "{bad}");
        }
        assert!(check_upload(None, 10).is_err());
    }

    #[test]
    fn size_limit_is_inclusive() {
        assert!(check_upload(Some("a.png"), MAX_AVATAR_BYTES).is_ok());
        assert!(matches!(
            check_upload(Some("a.png"), MAX_AVATAR_BYTES + 1),
            Err(AccountError::UploadRejected(_))
        ));
    }

    #[tokio::test]
    async fn normalizes_jpeg_to_square_png() {
        let jpeg = sample_image(640, 320, ImageFormat::Jpeg);
        let png = normalize_avatar(Bytes::from(jpeg)).await.expect("normalize");

        assert_eq!(image::guess_format(&png).unwrap(), ImageFormat::Png);
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (AVATAR_SIDE, AVATAR_SIDE));
    }

    #[tokio::test]
    async fn undecodable_bytes_are_rejected() {
        let err = normalize_avatar(Bytes::from_static(b"definitely not an image"))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::UploadRejected(_)));
    }
}
