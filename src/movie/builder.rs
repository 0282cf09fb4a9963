//! Test-only container writer.
//!
//! Emits just enough of the wire profile (header, symbol table, solid-fill
//! shapes, sprite timelines) to exercise the parser and everything above it.

use crate::foundation::core::Rgba8;

pub(crate) struct BitWriter {
    out: Vec<u8>,
    cur: u8,
    used: u32,
}

impl BitWriter {
    pub(crate) fn new() -> Self {
        Self {
            out: Vec::new(),
            cur: 0,
            used: 0,
        }
    }

    pub(crate) fn ub(&mut self, n: u32, value: u32) {
        for i in (0..n).rev() {
            let bit = ((value >> i) & 1) as u8;
            self.cur = (self.cur << 1) | bit;
            self.used += 1;
            if self.used == 8 {
                self.out.push(self.cur);
                self.cur = 0;
                self.used = 0;
            }
        }
    }

    pub(crate) fn sb(&mut self, n: u32, value: i32) {
        let mask = if n >= 32 { u64::MAX } else { (1u64 << n) - 1 };
        self.ub(n, ((value as i64 as u64) & mask) as u32);
    }

    pub(crate) fn finish(mut self) -> Vec<u8> {
        if self.used > 0 {
            self.out.push(self.cur << (8 - self.used));
        }
        self.out
    }
}

/// Smallest signed bit width that holds every value (at least 1).
pub(crate) fn nbits_signed(values: &[i32]) -> u32 {
    values
        .iter()
        .map(|&v| {
            let m = if v < 0 { !v } else { v } as u32;
            33 - m.leading_zeros()
        })
        .max()
        .unwrap_or(1)
}

fn fixed16(v: f64) -> i32 {
    (v * 65536.0).round() as i32
}

fn push_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Wrap a tag body in a header, using the long form when needed.
pub(crate) fn tag(code: u16, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 6);
    if body.len() < 0x3F {
        push_u16(&mut out, (code << 6) | body.len() as u16);
    } else {
        push_u16(&mut out, (code << 6) | 0x3F);
        push_u32(&mut out, body.len() as u32);
    }
    out.extend_from_slice(body);
    out
}

pub(crate) fn rect(x_min: i32, x_max: i32, y_min: i32, y_max: i32) -> Vec<u8> {
    let n = nbits_signed(&[x_min, x_max, y_min, y_max]);
    let mut b = BitWriter::new();
    b.ub(5, n);
    b.sb(n, x_min);
    b.sb(n, x_max);
    b.sb(n, y_min);
    b.sb(n, y_max);
    b.finish()
}

pub(crate) fn matrix_bytes(scale: Option<(f64, f64)>, translate_twips: (i32, i32)) -> Vec<u8> {
    let mut b = BitWriter::new();
    match scale {
        Some((sx, sy)) => {
            let fx = fixed16(sx);
            let fy = fixed16(sy);
            let n = nbits_signed(&[fx, fy]);
            b.ub(1, 1);
            b.ub(5, n);
            b.sb(n, fx);
            b.sb(n, fy);
        }
        None => b.ub(1, 0),
    }
    b.ub(1, 0); // no rotate/skew
    let (tx, ty) = translate_twips;
    let n = nbits_signed(&[tx, ty]);
    b.ub(5, n);
    b.sb(n, tx);
    b.sb(n, ty);
    b.finish()
}

/// Complete DefineShape tag (any version) holding one solid square with
/// top-left corner `(x, y)` and side `size`, all in twips.
pub(crate) fn define_shape_square(
    version: u8,
    id: u16,
    x: i32,
    y: i32,
    size: i32,
    color: Rgba8,
) -> Vec<u8> {
    let mut body = Vec::new();
    push_u16(&mut body, id);
    body.extend(rect(x, x + size, y, y + size));
    if version == 4 {
        body.extend(rect(x, x + size, y, y + size));
        body.push(0);
    }
    body.push(1); // one fill style
    body.push(0x00); // solid
    body.extend([color.r, color.g, color.b]);
    if version >= 3 {
        body.push(color.a);
    }
    body.push(0); // no line styles

    let mut b = BitWriter::new();
    b.ub(4, 1); // fill index bits
    b.ub(4, 0); // line index bits
    b.ub(1, 0);
    b.ub(5, 0b00101); // move-to + select fill 1 on the right
    let n = nbits_signed(&[x, y]);
    b.ub(5, n);
    b.sb(n, x);
    b.sb(n, y);
    b.ub(1, 1); // fill style 1
    edge(&mut b, size, 0);
    edge(&mut b, 0, size);
    edge(&mut b, -size, 0);
    edge(&mut b, 0, -size);
    b.ub(1, 0);
    b.ub(5, 0); // end of records
    body.extend(b.finish());

    let code = match version {
        1 => 2,
        2 => 22,
        3 => 32,
        _ => 83,
    };
    tag(code, &body)
}

fn edge(b: &mut BitWriter, dx: i32, dy: i32) {
    b.ub(1, 1);
    b.ub(1, 1); // straight
    let n = nbits_signed(&[dx, dy]).max(2);
    b.ub(4, n - 2);
    if dx != 0 && dy != 0 {
        b.ub(1, 1);
        b.sb(n, dx);
        b.sb(n, dy);
    } else if dx == 0 {
        b.ub(1, 0);
        b.ub(1, 1);
        b.sb(n, dy);
    } else {
        b.ub(1, 0);
        b.ub(1, 0);
        b.sb(n, dx);
    }
}

pub(crate) enum Ctrl {
    Place {
        depth: u16,
        character: Option<u16>,
        matrix: Option<(Option<(f64, f64)>, (i32, i32))>,
    },
    Remove {
        depth: u16,
    },
    Show,
}

impl Ctrl {
    pub(crate) fn place(depth: u16, character: u16) -> Self {
        Ctrl::Place {
            depth,
            character: Some(character),
            matrix: None,
        }
    }

    pub(crate) fn place_at(depth: u16, character: u16, translate_twips: (i32, i32)) -> Self {
        Ctrl::Place {
            depth,
            character: Some(character),
            matrix: Some((None, translate_twips)),
        }
    }

    pub(crate) fn place_scaled(
        depth: u16,
        character: u16,
        scale: (f64, f64),
        translate_twips: (i32, i32),
    ) -> Self {
        Ctrl::Place {
            depth,
            character: Some(character),
            matrix: Some((Some(scale), translate_twips)),
        }
    }

    /// Matrix-only update of an existing layer.
    pub(crate) fn update_matrix(depth: u16, translate_twips: (i32, i32)) -> Self {
        Ctrl::Place {
            depth,
            character: None,
            matrix: Some((None, translate_twips)),
        }
    }
}

/// Complete DefineSprite tag wrapping the given control stream.
pub(crate) fn define_sprite(id: u16, frame_count: u16, ctrl: &[Ctrl]) -> Vec<u8> {
    let mut body = Vec::new();
    push_u16(&mut body, id);
    push_u16(&mut body, frame_count);
    for c in ctrl {
        match c {
            Ctrl::Place {
                depth,
                character,
                matrix,
            } => {
                let mut t = Vec::new();
                let mut flags = 0u8;
                if character.is_some() {
                    flags |= 0x02;
                } else {
                    flags |= 0x01; // move
                }
                if matrix.is_some() {
                    flags |= 0x04;
                }
                t.push(flags);
                push_u16(&mut t, *depth);
                if let Some(ch) = character {
                    push_u16(&mut t, *ch);
                }
                if let Some((scale, translate)) = matrix {
                    t.extend(matrix_bytes(*scale, *translate));
                }
                body.extend(tag(26, &t));
            }
            Ctrl::Remove { depth } => {
                let mut t = Vec::new();
                push_u16(&mut t, *depth);
                body.extend(tag(28, &t));
            }
            Ctrl::Show => body.extend(tag(1, &[])),
        }
    }
    body.extend(tag(0, &[]));
    tag(39, &body)
}

pub(crate) fn symbol_class(entries: &[(&str, u16)]) -> Vec<u8> {
    let mut body = Vec::new();
    push_u16(&mut body, entries.len() as u16);
    for (name, id) in entries {
        push_u16(&mut body, *id);
        body.extend(name.as_bytes());
        body.push(0);
    }
    tag(76, &body)
}

/// Assemble a complete container from pre-encoded tags; the End tag and the
/// patched file length are appended here.
pub(crate) fn movie(tags_bytes: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"FWS");
    out.push(6);
    push_u32(&mut out, 0);
    out.extend(rect(0, 11000, 0, 8000));
    push_u16(&mut out, 24 << 8); // 24.0 fps, 8.8 fixed
    push_u16(&mut out, 1);
    for t in tags_bytes {
        out.extend_from_slice(t);
    }
    out.extend(tag(0, &[]));
    let len = out.len() as u32;
    out[4..8].copy_from_slice(&len.to_le_bytes());
    out
}
