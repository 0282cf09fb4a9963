use std::collections::HashMap;

use crate::foundation::core::{BezPath, CharacterId, Point, Rect, Rgba8};
use crate::foundation::error::{SkelterError, SkelterResult};
use crate::movie::tags::{Reader, read_rect};

/// One solid-filled region of a shape. Path coordinates are twips.
#[derive(Clone, Debug)]
pub struct FillPath {
    pub color: Rgba8,
    pub path: BezPath,
}

/// Canonical shape definition.
///
/// The container knows four generations of shape tags (RGB vs RGBA colors,
/// extended line styles); all of them normalize to this one form. `bounds`
/// is the authored bounding box in twips.
#[derive(Clone, Debug)]
pub struct ShapeDef {
    pub id: CharacterId,
    pub bounds: Rect,
    pub fills: Vec<FillPath>,
}

/// Decode a shape tag body. `version` is the tag generation (1 through 4).
pub(crate) fn parse_define_shape(body: &[u8], version: u8) -> SkelterResult<ShapeDef> {
    let mut r = Reader::new(body);
    let id = CharacterId(r.read_u16()?);
    let bounds = read_rect(&mut r)?;
    if version == 4 {
        let _edge_bounds = read_rect(&mut r)?;
        let _flags = r.read_u8()?;
    }

    let mut styles = read_fill_styles(&mut r, version)?;
    skip_line_styles(&mut r, version)?;

    let mut sink = EdgeSink::default();
    sink.begin_styles(styles.len());

    // Pen state persists across the whole record stream, including style
    // replacements.
    let mut pos = (0i32, 0i32);
    let (mut fill0, mut fill1) = (0u32, 0u32);

    'stream: loop {
        let mut bits = r.bits();
        let num_fill_bits = bits.ub(4)?;
        let num_line_bits = bits.ub(4)?;
        loop {
            if bits.ub(1)? == 0 {
                // Style-change record; all-zero flags end the shape.
                let flags = bits.ub(5)?;
                if flags == 0 {
                    break 'stream;
                }
                if flags & 0x01 != 0 {
                    // Move-to is absolute.
                    let n = bits.ub(5)?;
                    pos = (bits.sb(n)?, bits.sb(n)?);
                }
                if flags & 0x02 != 0 {
                    fill0 = bits.ub(num_fill_bits)?;
                }
                if flags & 0x04 != 0 {
                    fill1 = bits.ub(num_fill_bits)?;
                }
                if flags & 0x08 != 0 {
                    let _line = bits.ub(num_line_bits)?;
                }
                if flags & 0x10 != 0 {
                    if version < 2 {
                        return Err(SkelterError::parse(
                            "style replacement record in a version 1 shape",
                        ));
                    }
                    // Replacement style arrays are byte-aligned; the partial
                    // bit buffer is discarded with the bit reader.
                    drop(bits);
                    sink.flush(&styles)?;
                    styles = read_fill_styles(&mut r, version)?;
                    skip_line_styles(&mut r, version)?;
                    sink.begin_styles(styles.len());
                    fill0 = 0;
                    fill1 = 0;
                    continue 'stream;
                }
            } else {
                let straight = bits.ub(1)? == 1;
                let n = bits.ub(4)? + 2;
                let (ctrl, to) = if straight {
                    let (dx, dy) = if bits.ub(1)? == 1 {
                        (bits.sb(n)?, bits.sb(n)?)
                    } else if bits.ub(1)? == 1 {
                        (0, bits.sb(n)?)
                    } else {
                        (bits.sb(n)?, 0)
                    };
                    (None, (pos.0 + dx, pos.1 + dy))
                } else {
                    let cx = pos.0 + bits.sb(n)?;
                    let cy = pos.1 + bits.sb(n)?;
                    let ax = cx + bits.sb(n)?;
                    let ay = cy + bits.sb(n)?;
                    (Some((cx, cy)), (ax, ay))
                };
                // A right fill takes the edge as drawn, a left fill takes it
                // reversed, so every loop winds consistently for the non-zero
                // rule no matter which side it was authored on.
                sink.record(fill1, EdgeRec { from: pos, ctrl, to })?;
                sink.record(
                    fill0,
                    EdgeRec {
                        from: to,
                        ctrl,
                        to: pos,
                    },
                )?;
                pos = to;
            }
        }
    }

    let fills = sink.finish(&styles)?;
    Ok(ShapeDef { id, bounds, fills })
}

#[derive(Clone, Copy, Debug)]
struct EdgeRec {
    from: (i32, i32),
    ctrl: Option<(i32, i32)>,
    to: (i32, i32),
}

/// Collects directed edges per active fill style and stitches them into
/// closed paths when a style array goes out of scope.
#[derive(Default)]
struct EdgeSink {
    by_style: Vec<Vec<EdgeRec>>,
    out: Vec<FillPath>,
}

impl EdgeSink {
    fn begin_styles(&mut self, count: usize) {
        self.by_style = vec![Vec::new(); count];
    }

    /// Record an edge against a 1-based style index; index 0 means no fill.
    fn record(&mut self, style: u32, edge: EdgeRec) -> SkelterResult<()> {
        if style == 0 {
            return Ok(());
        }
        match self.by_style.get_mut(style as usize - 1) {
            Some(edges) => {
                edges.push(edge);
                Ok(())
            }
            None => Err(SkelterError::parse(format!(
                "fill style index {style} out of range ({} styles)",
                self.by_style.len()
            ))),
        }
    }

    fn flush(&mut self, styles: &[Rgba8]) -> SkelterResult<()> {
        if self.by_style.len() != styles.len() {
            return Err(SkelterError::parse(
                "internal error: style array desynchronized from edge sink",
            ));
        }
        for (edges, color) in self.by_style.drain(..).zip(styles) {
            if edges.is_empty() {
                continue;
            }
            self.out.push(FillPath {
                color: *color,
                path: stitch_edges(edges),
            });
        }
        Ok(())
    }

    fn finish(mut self, styles: &[Rgba8]) -> SkelterResult<Vec<FillPath>> {
        self.flush(styles)?;
        Ok(self.out)
    }
}

/// Chain an edge soup into subpaths by matching endpoints exactly (all
/// coordinates are integral twips, so equality is reliable). Unclosed runs are
/// left open; the non-zero fill closes them implicitly.
fn stitch_edges(edges: Vec<EdgeRec>) -> BezPath {
    let mut by_start: HashMap<(i32, i32), Vec<usize>> = HashMap::new();
    for (i, edge) in edges.iter().enumerate() {
        by_start.entry(edge.from).or_default().push(i);
    }

    let mut used = vec![false; edges.len()];
    let mut path = BezPath::new();
    for first in 0..edges.len() {
        if used[first] {
            continue;
        }
        let start = edges[first].from;
        path.move_to(twips_point(start));
        let mut cur = first;
        loop {
            used[cur] = true;
            let edge = edges[cur];
            match edge.ctrl {
                Some(ctrl) => path.quad_to(twips_point(ctrl), twips_point(edge.to)),
                None => path.line_to(twips_point(edge.to)),
            }
            if edge.to == start {
                path.close_path();
                break;
            }
            let next = by_start
                .get(&edge.to)
                .and_then(|cands| cands.iter().copied().find(|&i| !used[i]));
            match next {
                Some(i) => cur = i,
                None => break,
            }
        }
    }
    path
}

fn twips_point(p: (i32, i32)) -> Point {
    Point::new(f64::from(p.0), f64::from(p.1))
}

fn read_fill_styles(r: &mut Reader, version: u8) -> SkelterResult<Vec<Rgba8>> {
    let mut count = usize::from(r.read_u8()?);
    if count == 0xFF {
        if version < 2 {
            return Err(SkelterError::parse(
                "extended fill style count in a version 1 shape",
            ));
        }
        count = usize::from(r.read_u16()?);
    }
    (0..count).map(|_| read_fill_style(r, version)).collect()
}

fn read_fill_style(r: &mut Reader, version: u8) -> SkelterResult<Rgba8> {
    let ty = r.read_u8()?;
    if ty != 0x00 {
        return Err(SkelterError::parse(format!(
            "unsupported fill style 0x{ty:02x} (solid fills only)"
        )));
    }
    read_color(r, version >= 3)
}

fn read_color(r: &mut Reader, with_alpha: bool) -> SkelterResult<Rgba8> {
    let rgb = r.take(3)?;
    let a = if with_alpha { r.read_u8()? } else { 255 };
    Ok(Rgba8 {
        r: rgb[0],
        g: rgb[1],
        b: rgb[2],
        a,
    })
}

/// Line styles are not drawn, but they sit between the fill styles and the
/// records, so they must be walked precisely.
fn skip_line_styles(r: &mut Reader, version: u8) -> SkelterResult<()> {
    let mut count = usize::from(r.read_u8()?);
    if count == 0xFF {
        count = usize::from(r.read_u16()?);
    }
    for _ in 0..count {
        let _width = r.read_u16()?;
        if version == 4 {
            let b0 = r.read_u8()?;
            let _b1 = r.read_u8()?;
            let join = (b0 >> 4) & 0b11;
            if join == 2 {
                let _miter = r.read_u16()?;
            }
            if b0 & 0b0000_1000 != 0 {
                let _fill = read_fill_style(r, version)?;
            } else {
                let _color = read_color(r, true)?;
            }
        } else {
            let _color = read_color(r, version >= 3)?;
        }
    }
    Ok(())
}
