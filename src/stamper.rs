use crate::error::AppError;
use crate::exiftool::{self, ExiftoolCmd};
use std::path::Path;

const STITCHING_SOFTWARE: &str = "streetview_uploader";
const PROJECTION_EQUIRECTANGULAR: &str = "equirectangular";

/// The GPano XMP tag set written onto a panorama.
///
/// The image is assumed to be the full, uncropped sphere: cropped and full
/// dimensions both equal the pixel dimensions and the crop offsets are zero.
#[derive(Debug, Clone, PartialEq)]
pub struct PanoTags {
    pub use_panorama_viewer: bool,
    pub projection_type: &'static str,
    pub cropped_area_width: u32,
    pub cropped_area_height: u32,
    pub full_pano_width: u32,
    pub full_pano_height: u32,
    pub cropped_area_left: u32,
    pub cropped_area_top: u32,
    pub pose_heading: u32,
    pub initial_view_heading: u32,
    pub stitching_software: &'static str,
}

impl PanoTags {
    pub fn for_dimensions(width: u32, height: u32) -> Self {
        PanoTags {
            use_panorama_viewer: true,
            projection_type: PROJECTION_EQUIRECTANGULAR,
            cropped_area_width: width,
            cropped_area_height: height,
            full_pano_width: width,
            full_pano_height: height,
            cropped_area_left: 0,
            cropped_area_top: 0,
            pose_heading: 0,
            initial_view_heading: 0,
            stitching_software: STITCHING_SOFTWARE,
        }
    }

    fn apply(&self, cmd: ExiftoolCmd) -> ExiftoolCmd {
        cmd.set_tag("XMP-GPano:UsePanoramaViewer", if self.use_panorama_viewer { "True" } else { "False" })
            .set_tag("XMP-GPano:ProjectionType", self.projection_type)
            .set_tag("XMP-GPano:CroppedAreaImageWidthPixels", self.cropped_area_width)
            .set_tag("XMP-GPano:CroppedAreaImageHeightPixels", self.cropped_area_height)
            .set_tag("XMP-GPano:FullPanoWidthPixels", self.full_pano_width)
            .set_tag("XMP-GPano:FullPanoHeightPixels", self.full_pano_height)
            .set_tag("XMP-GPano:CroppedAreaLeftPixels", self.cropped_area_left)
            .set_tag("XMP-GPano:CroppedAreaTopPixels", self.cropped_area_top)
            .set_tag("XMP-GPano:PoseHeadingDegrees", self.pose_heading)
            .set_tag("XMP-GPano:InitialViewHeadingDegrees", self.initial_view_heading)
            .set_tag("XMP-GPano:StitchingSoftware", self.stitching_software)
    }

    fn write_to(&self, path: &Path) -> Result<(), AppError> {
        let cmd = self.apply(ExiftoolCmd::new().overwrite_original()).file(path);
        cmd.run()?;
        Ok(())
    }
}

/// Measures the image and overwrites it with Photo Sphere metadata.
/// Returns the measured (width, height).
pub fn stamp(path: &Path) -> Result<(u32, u32), AppError> {
    if !path.is_file() {
        return Err(AppError::Precondition(format!(
            "image file not found: {}",
            path.display()
        )));
    }

    let (width, height) = exiftool::read_dimensions(path)?;
    log::info!("Measured {:?}: {}x{}", path, width, height);

    let tags = PanoTags::for_dimensions(width, height);
    tags.write_to(path)?;
    log::info!("Stamped GPano tags onto {:?}", path);

    Ok((width, height))
}
