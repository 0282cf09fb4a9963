use byteorder::{ByteOrder, LittleEndian};

use crate::foundation::core::{Affine, Rect, twips_to_px};
use crate::foundation::error::{SkelterError, SkelterResult};

pub(crate) const TAG_END: u16 = 0;
pub(crate) const TAG_SHOW_FRAME: u16 = 1;
pub(crate) const TAG_DEFINE_SHAPE: u16 = 2;
pub(crate) const TAG_DEFINE_SHAPE2: u16 = 22;
pub(crate) const TAG_PLACE_OBJECT2: u16 = 26;
pub(crate) const TAG_REMOVE_OBJECT2: u16 = 28;
pub(crate) const TAG_DEFINE_SHAPE3: u16 = 32;
pub(crate) const TAG_DEFINE_SPRITE: u16 = 39;
pub(crate) const TAG_SYMBOL_CLASS: u16 = 76;
pub(crate) const TAG_DEFINE_SHAPE4: u16 = 83;

/// Byte-level reader over a borrowed container slice.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub(crate) fn take(&mut self, n: usize) -> SkelterResult<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.buf.len());
        let Some(end) = end else {
            return Err(SkelterError::parse(format!(
                "container data truncated at byte {} (wanted {n} more)",
                self.pos
            )));
        };
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn read_u8(&mut self) -> SkelterResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_u16(&mut self) -> SkelterResult<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub(crate) fn read_u32(&mut self) -> SkelterResult<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    /// NUL-terminated UTF-8 string.
    pub(crate) fn read_cstring(&mut self) -> SkelterResult<String> {
        let rest = &self.buf[self.pos..];
        let Some(nul) = rest.iter().position(|&b| b == 0) else {
            return Err(SkelterError::parse(format!(
                "unterminated string at byte {}",
                self.pos
            )));
        };
        let bytes = &rest[..nul];
        self.pos += nul + 1;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| SkelterError::parse("symbol name is not valid utf-8"))
    }

    /// Start a bit-level read at the current byte. Dropping the [`BitReader`]
    /// discards any partial byte, leaving this reader byte-aligned.
    pub(crate) fn bits<'r>(&'r mut self) -> BitReader<'r, 'a> {
        BitReader {
            reader: self,
            bits: 0,
            count: 0,
        }
    }
}

/// MSB-first bit reader over a [`Reader`]. Whole bytes are pulled lazily, so
/// the underlying reader always ends up at the next byte boundary.
pub(crate) struct BitReader<'r, 'a> {
    reader: &'r mut Reader<'a>,
    bits: u64,
    count: u32,
}

impl BitReader<'_, '_> {
    /// Read `n` unsigned bits (`n <= 32`; `n == 0` yields 0).
    pub(crate) fn ub(&mut self, n: u32) -> SkelterResult<u32> {
        if n == 0 {
            return Ok(0);
        }
        while self.count < n {
            let byte = self.reader.read_u8()?;
            self.bits = (self.bits << 8) | u64::from(byte);
            self.count += 8;
        }
        self.count -= n;
        let value = (self.bits >> self.count) & ((1u64 << n) - 1);
        Ok(value as u32)
    }

    /// Read `n` bits as a sign-extended two's complement integer.
    pub(crate) fn sb(&mut self, n: u32) -> SkelterResult<i32> {
        let raw = self.ub(n)?;
        if n == 0 {
            return Ok(0);
        }
        if n < 32 && raw & (1 << (n - 1)) != 0 {
            Ok((i64::from(raw) - (1i64 << n)) as i32)
        } else {
            Ok(raw as i32)
        }
    }

    /// Read `n` bits as a signed 16.16 fixed-point value.
    pub(crate) fn fb(&mut self, n: u32) -> SkelterResult<f64> {
        Ok(f64::from(self.sb(n)?) / 65536.0)
    }
}

/// Tag header plus body. Short headers pack code and length into one word;
/// length `0x3F` switches to a 32-bit length.
pub(crate) fn read_tag<'a>(r: &mut Reader<'a>) -> SkelterResult<(u16, &'a [u8])> {
    let code_and_len = r.read_u16()?;
    let code = code_and_len >> 6;
    let mut length = usize::from(code_and_len & 0x3F);
    if length == 0x3F {
        length = r.read_u32()? as usize;
    }
    Ok((code, r.take(length)?))
}

/// Bit-packed bounds rectangle, kept in twips.
pub(crate) fn read_rect(r: &mut Reader) -> SkelterResult<Rect> {
    let mut bits = r.bits();
    let n = bits.ub(5)?;
    let x_min = bits.sb(n)?;
    let x_max = bits.sb(n)?;
    let y_min = bits.sb(n)?;
    let y_max = bits.sb(n)?;
    Ok(Rect::new(
        f64::from(x_min),
        f64::from(y_min),
        f64::from(x_max),
        f64::from(y_max),
    ))
}

/// Bit-packed placement matrix. Scale and skew are 16.16 fixed point and
/// dimensionless; the translation is stored in twips and converted here, so
/// decoded matrices compose in pixel space.
pub(crate) fn read_matrix(r: &mut Reader) -> SkelterResult<Affine> {
    let mut bits = r.bits();
    let (mut sx, mut sy) = (1.0, 1.0);
    if bits.ub(1)? == 1 {
        let n = bits.ub(5)?;
        sx = bits.fb(n)?;
        sy = bits.fb(n)?;
    }
    let (mut skew0, mut skew1) = (0.0, 0.0);
    if bits.ub(1)? == 1 {
        let n = bits.ub(5)?;
        skew0 = bits.fb(n)?;
        skew1 = bits.fb(n)?;
    }
    let n = bits.ub(5)?;
    let tx = bits.sb(n)?;
    let ty = bits.sb(n)?;
    Ok(Affine::new([
        sx,
        skew0,
        skew1,
        sy,
        twips_to_px(tx),
        twips_to_px(ty),
    ]))
}

#[cfg(test)]
#[path = "../../tests/unit/movie/tags.rs"]
mod tests;
