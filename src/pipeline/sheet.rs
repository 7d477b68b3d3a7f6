use super::PipelineError;
use image::{
    imageops::{self, FilterType},
    GenericImageView, GrayImage, ImageReader,
};
use std::io::Cursor;

pub const SHEET_WIDTH: u32 = 2213;
pub const SHEET_HEIGHT: u32 = 1572;
pub const LEAD_COUNT: usize = 12;

const LEAD_ROWS: [(u32, u32); 3] = [(300, 600), (600, 900), (900, 1200)];
const LEAD_COLUMNS: [(u32, u32); 4] = [(150, 643), (646, 1135), (1140, 1625), (1630, 2125)];

/// Decodes the upload and returns it as a grayscale sheet at the reference
/// resolution the lead grid is defined on.
pub fn read_sheet(image_data: &[u8]) -> Result<GrayImage, PipelineError> {
    let image_reader = ImageReader::new(Cursor::new(image_data))
        .with_guessed_format()
        .map_err(|e| PipelineError::Decode(e.to_string()))?;

    let original_img = image_reader
        .decode()
        .map_err(|e| PipelineError::Decode(e.to_string()))?;

    let (img_width, img_height) = original_img.dimensions();
    tracing::debug!("Decoded ECG sheet of {}x{}", img_width, img_height);

    let gray = original_img.to_luma8();
    if gray.dimensions() == (SHEET_WIDTH, SHEET_HEIGHT) {
        return Ok(gray);
    }
    Ok(imageops::resize(
        &gray,
        SHEET_WIDTH,
        SHEET_HEIGHT,
        FilterType::Triangle,
    ))
}

/// Crops the 3x4 grid of standard leads, row by row.
pub fn divide_leads(sheet: &GrayImage) -> Vec<GrayImage> {
    LEAD_ROWS
        .iter()
        .flat_map(|&(top, bottom)| {
            LEAD_COLUMNS.iter().map(move |&(left, right)| {
                imageops::crop_imm(sheet, left, top, right - left, bottom - top).to_image()
            })
        })
        .collect()
}
