use crate::services::error::ServiceError;
use crate::services::pdf::RasterPage;
use crate::utils::validation::extension_of;
use image::DynamicImage;
use std::path::Path;
use std::process::Command;
use tempfile::NamedTempFile;

fn is_heif(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(extension_of)
        .is_some_and(|ext| ext == "heic" || ext == "heif")
}

/// Decodes an image file and normalizes it to 8-bit RGB.
pub fn load_raster(path: &Path, ffmpeg: &str) -> Result<RasterPage, ServiceError> {
    let name = path.display().to_string();
    let img = if is_heif(path) {
        decode_heif(path, ffmpeg)?
    } else {
        image::io::Reader::open(path)?
            .with_guessed_format()?
            .decode()
            .map_err(|e| ServiceError::conversion(&name, e))?
    };

    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err(ServiceError::conversion(name, "image has no pixels"));
    }

    Ok(RasterPage {
        width,
        height,
        pixels: rgb.into_raw(),
    })
}

/// HEIC/HEIF goes through ffmpeg into a temporary PNG.
fn decode_heif(path: &Path, ffmpeg: &str) -> Result<DynamicImage, ServiceError> {
    let name = path.display().to_string();
    let output_file = NamedTempFile::with_suffix(".png")?;

    let output = Command::new(ffmpeg)
        .arg("-y") // Overwrite the empty temp file
        .arg("-loglevel")
        .arg("error")
        .arg("-i")
        .arg(path.as_os_str())
        .arg("-frames:v")
        .arg("1")
        .arg(output_file.path().as_os_str())
        .output()
        .map_err(|e| ServiceError::conversion(&name, format!("could not run {}: {}", ffmpeg, e)))?;

    if !output.status.success() {
        let err_msg = String::from_utf8_lossy(&output.stderr);
        tracing::error!("ffmpeg failed on HEIC/HEIF {}: {}", name, err_msg);
        return Err(ServiceError::conversion(name, format!("ffmpeg failed: {}", err_msg.trim())));
    }

    image::open(output_file.path()).map_err(|e| ServiceError::conversion(name, e))
}
