use crate::shared::bounding_box::{BoundingBox, Size};

/// Maps image-space boxes into a view that shows the whole image
/// aspect-fit and centered.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewTransform {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl ViewTransform {
    pub fn apply(&self, bbox: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            bbox.x * self.scale + self.offset_x,
            bbox.y * self.scale + self.offset_y,
            bbox.width * self.scale,
            bbox.height * self.scale,
        )
    }
}

pub fn aspect_fit(image_size: Size, view_size: Size) -> ViewTransform {
    if image_size.width == 0 || image_size.height == 0 {
        return ViewTransform {
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        };
    }

    let (iw, ih) = (image_size.width as f32, image_size.height as f32);
    let (vw, vh) = (view_size.width as f32, view_size.height as f32);
    let scale = (vw / iw).min(vh / ih);
    ViewTransform {
        scale,
        offset_x: (vw - iw * scale) / 2.0,
        offset_y: (vh - ih * scale) / 2.0,
    }
}
