use glam::Vec2;
use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle on the label image.
///
/// Coordinates follow the image convention: the origin is the top-left corner
/// and `y` grows downward, so `min` is the top-left and `max` the bottom-right
/// corner. Recognizers usually hand over coordinates normalised to `0.0..=1.0`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bbox {
    /// The top-left corner.
    pub min: Vec2,
    /// The bottom-right corner.
    pub max: Vec2,
}

impl Bbox {
    /// Creates a new rectangle from its top-left and bottom-right corners.
    ///
    /// # Example
    /// ```
    /// use glam::Vec2;
    /// use nutriscan_core::analysis::bbox::Bbox;
    /// let bbox = Bbox::new(Vec2::new(0.1, 0.2), Vec2::new(0.4, 0.25));
    /// assert!((bbox.width() - 0.3).abs() < 1e-6);
    /// ```
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Creates a rectangle from its top-left corner and its size.
    ///
    /// # Example
    /// ```
    /// use nutriscan_core::analysis::bbox::Bbox;
    /// let bbox = Bbox::from_xywh(1.0, 2.0, 5.0, 3.0);
    /// assert_eq!(bbox.max.x, 6.0);
    /// assert_eq!(bbox.max.y, 5.0);
    /// ```
    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        let min = Vec2::new(x, y);
        Self {
            min,
            max: min + Vec2::new(width, height),
        }
    }

    /// Smallest rectangle covering every rectangle of the iterator, `None` when it is empty.
    pub fn union_all<'a>(rects: impl IntoIterator<Item = &'a Bbox>) -> Option<Bbox> {
        rects
            .into_iter()
            .fold(None, |acc: Option<Bbox>, rect| match acc {
                Some(acc) => Some(acc.union(rect)),
                None => Some(*rect),
            })
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    /// Area of the rectangle (width × height).
    pub fn area(&self) -> f32 {
        let length = self.max - self.min;

        length.x * length.y
    }

    /// Centre point of the rectangle.
    ///
    /// # Example
    /// ```
    /// use glam::Vec2;
    /// use nutriscan_core::analysis::bbox::Bbox;
    /// let bbox = Bbox::new(Vec2::new(0.0, 0.0), Vec2::new(4.0, 2.0));
    /// assert_eq!(bbox.center(), Vec2::new(2.0, 1.0));
    /// ```
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) / 2.0
    }

    /// Area shared by both rectangles, `0.0` when they do not intersect.
    ///
    /// # Example
    /// ```
    /// use glam::Vec2;
    /// use nutriscan_core::analysis::bbox::Bbox;
    /// let bbox1 = Bbox::new(Vec2::new(0.0, 0.0), Vec2::new(4.0, 4.0));
    /// let bbox2 = Bbox::new(Vec2::new(2.0, 2.0), Vec2::new(6.0, 6.0));
    /// assert_eq!(bbox1.intersection(&bbox2), 4.0);
    /// ```
    pub fn intersection(&self, other: &Self) -> f32 {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);

        if max.x > min.x && max.y > min.y {
            (max.x - min.x) * (max.y - min.y)
        } else {
            0.
        }
    }

    /// Smallest rectangle enclosing both rectangles.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Whether `other` lies completely inside this rectangle (edges included).
    pub fn contains(&self, other: &Self) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
    }

    /// Intersection area divided by the smaller of the two areas.
    ///
    /// Unlike IoU this reaches `1.0` as soon as the smaller rectangle sits
    /// inside the larger one, which is what matters when OCR returns the same
    /// number twice with slightly different rectangles.
    pub fn overlap_ratio(&self, other: &Self) -> f32 {
        let intersection_area = self.intersection(other);
        let min_area = self.area().min(other.area());

        if min_area > 0.0 {
            intersection_area / min_area
        } else {
            0.0
        }
    }

    /// Whether the rectangles overlap by at least `threshold` of the smaller area.
    pub fn overlaps_substantially(&self, other: &Self, threshold: f32) -> bool {
        self.overlap_ratio(other) >= threshold
    }

    /// Length of the shared horizontal projection.
    pub fn horizontal_overlap(&self, other: &Self) -> f32 {
        (self.max.x.min(other.max.x) - self.min.x.max(other.min.x)).max(0.0)
    }

    /// Length of the shared vertical projection.
    pub fn vertical_overlap(&self, other: &Self) -> f32 {
        (self.max.y.min(other.max.y) - self.min.y.max(other.min.y)).max(0.0)
    }

    /// Shared horizontal projection relative to the narrower rectangle.
    pub fn horizontal_overlap_ratio(&self, other: &Self) -> f32 {
        let min_width = self.width().min(other.width());
        if min_width > 0.0 {
            self.horizontal_overlap(other) / min_width
        } else {
            0.0
        }
    }

    /// Shared vertical projection relative to the shorter rectangle.
    ///
    /// # Example
    /// ```
    /// use nutriscan_core::analysis::bbox::Bbox;
    /// let column = Bbox::from_xywh(0.6, 0.2, 0.1, 0.6);
    /// let labels = Bbox::from_xywh(0.1, 0.5, 0.3, 0.4);
    /// // 0.3 of the labels' 0.4 height is shared with the column
    /// assert!((column.vertical_intersection_ratio(&labels) - 0.75).abs() < 1e-5);
    /// ```
    pub fn vertical_intersection_ratio(&self, other: &Self) -> f32 {
        let min_height = self.height().min(other.height());
        if min_height > 0.0 {
            self.vertical_overlap(other) / min_height
        } else {
            0.0
        }
    }

    /// Whether both rectangles sit on the same printed row.
    ///
    /// They must share part of their vertical projection and the vertical
    /// centre of one of them has to fall inside the other.
    pub fn is_inline_with(&self, other: &Self) -> bool {
        if self.vertical_overlap(other) <= 0.0 {
            return false;
        }
        let (own, theirs) = (self.center().y, other.center().y);
        (own >= other.min.y && own <= other.max.y) || (theirs >= self.min.y && theirs <= self.max.y)
    }

    /// Whether both rectangles sit in the same printed column.
    pub fn is_in_same_column_as(&self, other: &Self) -> bool {
        if self.horizontal_overlap(other) <= 0.0 {
            return false;
        }
        let (own, theirs) = (self.center().x, other.center().x);
        (own >= other.min.x && own <= other.max.x) || (theirs >= self.min.x && theirs <= self.max.x)
    }

    /// Whether this rectangle is entirely above `other`.
    pub fn is_above(&self, other: &Self) -> bool {
        self.center().y < other.center().y && !self.is_inline_with(other)
    }

    /// Copy of this rectangle stretched horizontally to cover `min_x..max_x`.
    pub fn with_horizontal_span(&self, min_x: f32, max_x: f32) -> Self {
        Self {
            min: Vec2::new(min_x, self.min.y),
            max: Vec2::new(max_x, self.max.y),
        }
    }
}
