//! Lazy pixel pipeline.
//!
//! A [`LazyImage`] is an immutable expression tree over materialized
//! [`PixelImage`] leaves. Point-wise nodes (maps, positional maps, 2/3-way
//! combinations) are evaluated on demand per pixel. Dilation nodes need
//! random multi-pass access to their input, so [`LazyImage::materialize`]
//! first resolves every dilation into a fresh leaf and then evaluates the
//! remaining point-wise tree once per output pixel.
//!
//! Every materialization runs inside an [`EvalContext`], which owns the
//! histogram scratch for sequential dilations (parallel dilations allocate
//! per worker) and a per-pass table of resolved nodes. A node reached
//! through several parents is resolved once per pass; the table is dropped
//! when the pass ends. Nothing is cached on the nodes
//! themselves, so a tree can be shared freely across threads.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ComputeError;
use crate::image::{check_dimensions, PixelImage, PixelKind};
use crate::max_filter::{max_at, max_filter, LineRadii, MaxFilterScratch};
#[cfg(feature = "tracing")]
use tracing::instrument;

pub type ColorFn = Arc<dyn Fn(u32) -> u32 + Send + Sync>;
pub type PositionalFn = Arc<dyn Fn(usize, usize, &LazyImage) -> u32 + Send + Sync>;
pub type Combine2Fn = Arc<dyn Fn(u32, u32) -> u32 + Send + Sync>;
pub type Combine3Fn = Arc<dyn Fn(u32, u32, u32) -> u32 + Send + Sync>;

enum Node {
    Source(Arc<PixelImage>),
    Map { src: LazyImage, op: ColorFn },
    MapPos { src: LazyImage, op: PositionalFn },
    Combine2 { a: LazyImage, b: LazyImage, op: Combine2Fn },
    Combine3 {
        a: LazyImage,
        b: LazyImage,
        c: LazyImage,
        op: Combine3Fn,
    },
    MaxFilter { src: LazyImage, radius: u32 },
}

impl Node {
    fn name(&self) -> &'static str {
        match self {
            Node::Source(_) => "source",
            Node::Map { .. } => "map",
            Node::MapPos { .. } => "mapi",
            Node::Combine2 { .. } => "combine2",
            Node::Combine3 { .. } => "combine3",
            Node::MaxFilter { .. } => "max_filter",
        }
    }
}

/// Immutable, cheaply clonable image expression.
#[derive(Clone)]
pub struct LazyImage {
    node: Arc<Node>,
    width: usize,
    height: usize,
    kind: PixelKind,
}

impl fmt::Debug for LazyImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyImage")
            .field("node", &self.node.name())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("kind", &self.kind)
            .finish()
    }
}

impl From<PixelImage> for LazyImage {
    fn from(img: PixelImage) -> Self {
        Self::from_image(img)
    }
}

impl LazyImage {
    fn with_node(node: Node, width: usize, height: usize, kind: PixelKind) -> Self {
        Self {
            node: Arc::new(node),
            width,
            height,
            kind,
        }
    }

    /// Leaf node over a materialized image.
    pub fn from_image(img: PixelImage) -> Self {
        Self::from_shared(Arc::new(img))
    }

    /// Leaf node over an image shared with other trees.
    pub fn from_shared(img: Arc<PixelImage>) -> Self {
        let (width, height) = img.dimensions();
        let kind = img.kind();
        Self::with_node(Node::Source(img), width, height, kind)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    #[inline]
    pub fn kind(&self) -> PixelKind {
        self.kind
    }

    /// Per-pixel color transformation producing pixels of `kind`.
    pub fn map(
        &self,
        kind: PixelKind,
        op: impl Fn(u32) -> u32 + Send + Sync + 'static,
    ) -> LazyImage {
        Self::with_node(
            Node::Map {
                src: self.clone(),
                op: Arc::new(op),
            },
            self.width,
            self.height,
            kind,
        )
    }

    /// Position-aware transformation. `op(x, y, src)` may read any pixel of `src`.
    pub fn mapi(
        &self,
        op: impl Fn(usize, usize, &LazyImage) -> u32 + Send + Sync + 'static,
    ) -> LazyImage {
        Self::with_node(
            Node::MapPos {
                src: self.clone(),
                op: Arc::new(op),
            },
            self.width,
            self.height,
            self.kind,
        )
    }

    /// Point-wise fusion of two same-sized images.
    pub fn combine2(
        &self,
        other: &LazyImage,
        kind: PixelKind,
        op: impl Fn(u32, u32) -> u32 + Send + Sync + 'static,
    ) -> Result<LazyImage, ComputeError> {
        check_dimensions(self.dimensions(), other.dimensions())?;
        Ok(Self::with_node(
            Node::Combine2 {
                a: self.clone(),
                b: other.clone(),
                op: Arc::new(op),
            },
            self.width,
            self.height,
            kind,
        ))
    }

    /// Point-wise fusion of three same-sized images.
    pub fn combine3(
        &self,
        b: &LazyImage,
        c: &LazyImage,
        kind: PixelKind,
        op: impl Fn(u32, u32, u32) -> u32 + Send + Sync + 'static,
    ) -> Result<LazyImage, ComputeError> {
        check_dimensions(self.dimensions(), b.dimensions())?;
        check_dimensions(self.dimensions(), c.dimensions())?;
        Ok(Self::with_node(
            Node::Combine3 {
                a: self.clone(),
                b: b.clone(),
                c: c.clone(),
                op: Arc::new(op),
            },
            self.width,
            self.height,
            kind,
        ))
    }

    /// Disc dilation (see [`crate::max_filter`]).
    pub fn max_filter(&self, radius: u32) -> LazyImage {
        Self::with_node(
            Node::MaxFilter {
                src: self.clone(),
                radius,
            },
            self.width,
            self.height,
            self.kind,
        )
    }

    /// Evaluate a single pixel.
    ///
    /// Dilation nodes are evaluated by a direct kernel scan, which is only
    /// reasonable for spot checks; use [`LazyImage::materialize`] for whole images.
    pub fn get(&self, x: usize, y: usize) -> u32 {
        match &*self.node {
            Node::Source(img) => img.get(x, y),
            Node::Map { src, op } => op(src.get(x, y)),
            Node::MapPos { src, op } => op(x, y, src),
            Node::Combine2 { a, b, op } => op(a.get(x, y), b.get(x, y)),
            Node::Combine3 { a, b, c, op } => op(a.get(x, y), b.get(x, y), c.get(x, y)),
            Node::MaxFilter { src, radius } => max_at(
                &|xx, yy| src.get(xx, yy),
                src.dimensions(),
                src.kind(),
                &LineRadii::new(*radius),
                x,
                y,
            ),
        }
    }

    /// Force evaluation into a flat buffer using a fresh [`EvalContext`].
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "trace", skip(self), fields(node = self.node.name(), w = self.width, h = self.height))
    )]
    pub fn materialize(&self) -> PixelImage {
        EvalContext::new().materialize(self)
    }

    /// Materialize and fold over all pixels in row-major order.
    pub fn fold<T>(&self, init: T, f: impl FnMut(T, u32) -> T) -> T {
        self.materialize().into_raw().into_iter().fold(init, f)
    }
}

/// Scratch state for one materialization pass.
///
/// A context must not be shared between concurrent evaluations; create one
/// per pass (or per thread) instead. The dilation scratch is reused across
/// passes, resolved nodes are not.
#[derive(Debug, Default)]
pub struct EvalContext {
    scratch: MaxFilterScratch,
    filters_run: usize,
    /// Keyed by node address. The original expression is kept alive next to
    /// its resolution so that no address is reused within a pass.
    resolved: HashMap<usize, (LazyImage, LazyImage)>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of dilations computed by this context so far.
    pub fn filters_run(&self) -> usize {
        self.filters_run
    }

    /// Evaluate `img` into a flat buffer.
    pub fn materialize(&mut self, img: &LazyImage) -> PixelImage {
        let out = self.evaluate(img);
        self.resolved.clear();
        out
    }

    fn evaluate(&mut self, img: &LazyImage) -> PixelImage {
        let resolved = self.resolve(img);
        if let Node::Source(src) = &*resolved.node {
            return PixelImage::clone(src);
        }
        PixelImage::from_fn(img.width, img.height, img.kind, |x, y| resolved.get(x, y))
    }

    /// Rewrite `img` so that every dilation becomes a materialized leaf.
    fn resolve(&mut self, img: &LazyImage) -> LazyImage {
        if let Node::Source(_) = &*img.node {
            return img.clone();
        }
        let key = Arc::as_ptr(&img.node) as usize;
        if let Some((_, done)) = self.resolved.get(&key) {
            return done.clone();
        }
        let out = self.resolve_node(img);
        self.resolved.insert(key, (img.clone(), out.clone()));
        out
    }

    fn resolve_node(&mut self, img: &LazyImage) -> LazyImage {
        let node = match &*img.node {
            Node::Source(_) => return img.clone(),
            Node::Map { src, op } => Node::Map {
                src: self.resolve(src),
                op: Arc::clone(op),
            },
            Node::MapPos { src, op } => Node::MapPos {
                src: self.resolve(src),
                op: Arc::clone(op),
            },
            Node::Combine2 { a, b, op } => Node::Combine2 {
                a: self.resolve(a),
                b: self.resolve(b),
                op: Arc::clone(op),
            },
            Node::Combine3 { a, b, c, op } => Node::Combine3 {
                a: self.resolve(a),
                b: self.resolve(b),
                c: self.resolve(c),
                op: Arc::clone(op),
            },
            Node::MaxFilter { src, radius } => {
                let input = self.evaluate(src);
                let out = max_filter(&input, *radius, &mut self.scratch);
                self.filters_run += 1;
                return LazyImage::from_image(out);
            }
        };
        LazyImage::with_node(node, img.width, img.height, img.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(w: usize, h: usize) -> PixelImage {
        PixelImage::from_fn(w, h, PixelKind::Gray, |x, y| (x + 3 * y) as u32)
    }

    #[test]
    fn map_and_combine_evaluate_pointwise() {
        let a = LazyImage::from_image(ramp(4, 3));
        let doubled = a.map(PixelKind::Gray, |p| p * 2);
        let sum = a
            .combine2(&doubled, PixelKind::Gray, |p, q| p + q)
            .unwrap()
            .materialize();
        assert_eq!(sum.get(3, 2), 3 * (3 + 6));
        assert_eq!(sum.get(0, 0), 0);
    }

    #[test]
    fn mapi_reads_arbitrary_positions() {
        let a = LazyImage::from_image(ramp(5, 2));
        let flipped = a.mapi(|x, y, src| src.get(src.width() - 1 - x, y));
        assert_eq!(flipped.get(0, 1), 4 + 3);
        assert_eq!(flipped.materialize().row(0), &[4, 3, 2, 1, 0]);
    }

    #[test]
    fn combine_rejects_mismatched_dimensions() {
        let a = LazyImage::from_image(ramp(4, 3));
        let b = LazyImage::from_image(ramp(3, 4));
        let err = a.combine2(&b, PixelKind::Gray, |p, _| p).unwrap_err();
        assert_eq!(
            err,
            ComputeError::DimensionMismatch {
                expected: (4, 3),
                found: (3, 4)
            }
        );
        assert!(a.combine3(&a, &b, PixelKind::Gray, |p, _, _| p).is_err());
    }

    #[test]
    fn materialized_dilation_matches_lazy_get() {
        let src = LazyImage::from_image(ramp(9, 7));
        let tree = src
            .map(PixelKind::Gray, |p| if p % 4 == 0 { p * 10 } else { 0 })
            .max_filter(2)
            .map(PixelKind::Gray, |p| p + 1);
        let out = tree.materialize();
        for y in 0..7 {
            for x in 0..9 {
                assert_eq!(out.get(x, y), tree.get(x, y), "at ({x}, {y})");
            }
        }
    }

    #[test]
    fn context_counts_each_dilation_once() {
        let src = LazyImage::from_image(ramp(6, 6));
        let near = src.max_filter(1);
        let far = near.max_filter(2);
        let both = near
            .combine2(&far, PixelKind::Gray, |a, b| b - a)
            .unwrap();
        let mut ctx = EvalContext::new();
        let out = ctx.materialize(&both);
        assert_eq!(ctx.filters_run(), 2);
        assert!(out.as_slice().iter().all(|&v| v < 255));

        // a second pass starts from an empty table
        ctx.materialize(&both);
        assert_eq!(ctx.filters_run(), 4);
    }

    #[test]
    fn shared_dilation_runs_once_per_pass() {
        let src = LazyImage::from_image(ramp(7, 5));
        let shared = src.max_filter(3);
        let pair = shared
            .combine2(&shared, PixelKind::Gray, |a, b| a + b)
            .unwrap();
        let tree = pair
            .combine3(&shared, &src, PixelKind::Gray, |p, q, r| p - q + r)
            .unwrap();
        let mut ctx = EvalContext::new();
        let out = ctx.materialize(&tree);
        assert_eq!(ctx.filters_run(), 1);
        for y in 0..5 {
            for x in 0..7 {
                assert_eq!(out.get(x, y), tree.get(x, y), "at ({x}, {y})");
            }
        }
    }

    #[test]
    fn fold_sums_all_pixels() {
        let src = LazyImage::from_image(ramp(3, 2));
        let total = src.fold(0u64, |acc, p| acc + p as u64);
        assert_eq!(total, (0 + 1 + 2 + 3 + 4 + 5) as u64);
    }
}
