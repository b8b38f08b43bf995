//! Typed access to a module's linear memory
//!
//! Little-endian, bounds-checked, width-exact. Only primitive and pointer
//! tags are accepted here; structs are walked by the marshal layer.

use super::types::{Primitive, Scalar, TypeTag, POINTER_SIZE};
use crate::error::{BridgeError, Result};

/// Width of the value stored for `tag`, rejecting shapes the facade cannot move
fn scalar_kind(tag: &TypeTag, context: &'static str) -> Result<Primitive> {
    match tag {
        TypeTag::Primitive(p) => Ok(*p),
        TypeTag::Pointer(_) => Ok(Primitive::U32),
        TypeTag::Void | TypeTag::Struct(_) => Err(BridgeError::InvalidTypeTag {
            tag: tag.to_string(),
            context,
        }),
    }
}

#[inline]
fn span(memory_size: usize, address: u32, len: u32) -> Result<core::ops::Range<usize>> {
    let start = address as usize;
    let end = start.checked_add(len as usize);
    match end {
        Some(end) if end <= memory_size => Ok(start..end),
        _ => Err(BridgeError::OutOfBounds {
            address,
            len,
            memory_size,
        }),
    }
}

/// Borrow `len` bytes at `address`
pub fn bytes(memory: &[u8], address: u32, len: u32) -> Result<&[u8]> {
    let range = span(memory.len(), address, len)?;
    Ok(&memory[range])
}

/// Read one primitive (or pointer) at `address`
pub fn read(memory: &[u8], address: u32, tag: &TypeTag) -> Result<Scalar> {
    let kind = scalar_kind(tag, "a memory read")?;
    read_primitive(memory, address, kind)
}

pub fn read_primitive(memory: &[u8], address: u32, kind: Primitive) -> Result<Scalar> {
    let raw = bytes(memory, address, kind.size())?;
    let mut buf = [0u8; 8];
    buf[..raw.len()].copy_from_slice(raw);

    Ok(match kind {
        Primitive::I8 => Scalar::Int(i8::from_le_bytes([buf[0]]).into()),
        Primitive::U8 => Scalar::Int(buf[0].into()),
        Primitive::I16 => Scalar::Int(i16::from_le_bytes([buf[0], buf[1]]).into()),
        Primitive::U16 => Scalar::Int(u16::from_le_bytes([buf[0], buf[1]]).into()),
        Primitive::I32 => Scalar::Int(i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]).into()),
        Primitive::U32 => Scalar::Int(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]).into()),
        Primitive::I64 => Scalar::Int(i64::from_le_bytes(buf)),
        Primitive::F32 => {
            Scalar::Float(f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]).into())
        }
        Primitive::F64 => Scalar::Float(f64::from_le_bytes(buf)),
    })
}

/// Read a 32-bit address
#[inline]
pub fn read_address(memory: &[u8], address: u32) -> Result<u32> {
    let raw = bytes(memory, address, POINTER_SIZE)?;
    Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

/// Encode `value` as the little-endian bytes of `kind`
///
/// Integers outside the kind's range are rejected rather than truncated.
pub fn encode(value: Scalar, kind: Primitive) -> Result<([u8; 8], usize)> {
    let mut out = [0u8; 8];
    let width = kind.size() as usize;

    match (kind, value) {
        (Primitive::F32, Scalar::Float(v)) => out[..4].copy_from_slice(&(v as f32).to_le_bytes()),
        (Primitive::F32, Scalar::Int(v)) => out[..4].copy_from_slice(&(v as f32).to_le_bytes()),
        (Primitive::F64, Scalar::Float(v)) => out.copy_from_slice(&v.to_le_bytes()),
        (Primitive::F64, Scalar::Int(v)) => out.copy_from_slice(&(v as f64).to_le_bytes()),
        (_, Scalar::Float(v)) => {
            return Err(BridgeError::ValueShape {
                tag: kind.name().to_string(),
                expected: "integer",
                found: format!("float {}", v),
            })
        }
        (_, Scalar::Int(v)) => {
            let (lo, hi) = kind.int_range().unwrap_or((i64::MIN, i64::MAX));
            if v < lo || v > hi {
                return Err(BridgeError::ValueOutOfRange {
                    value: v.to_string(),
                    tag: kind.name().to_string(),
                });
            }
            // Two's complement truncation is exact once the range check passed
            out[..width].copy_from_slice(&v.to_le_bytes()[..width]);
        }
    }
    Ok((out, width))
}

/// Write one primitive (or pointer) at `address`
pub fn write(memory: &mut [u8], address: u32, value: Scalar, tag: &TypeTag) -> Result<()> {
    let kind = scalar_kind(tag, "a memory write")?;
    write_primitive(memory, address, value, kind)
}

pub fn write_primitive(memory: &mut [u8], address: u32, value: Scalar, kind: Primitive) -> Result<()> {
    let (encoded, width) = encode(value, kind)?;
    let range = span(memory.len(), address, width as u32)?;
    memory[range].copy_from_slice(&encoded[..width]);
    Ok(())
}

/// Write a 32-bit address
#[inline]
pub fn write_address(memory: &mut [u8], address: u32, value: u32) -> Result<()> {
    let range = span(memory.len(), address, POINTER_SIZE)?;
    memory[range].copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Write a run of same-typed primitives contiguously from `address`
///
/// Values are encoded up front so a bad element leaves memory untouched.
pub fn write_bulk(memory: &mut [u8], address: u32, values: &[Scalar], tag: &TypeTag) -> Result<()> {
    let kind = scalar_kind(tag, "a bulk memory write")?;
    let width = kind.size();
    let total = width
        .checked_mul(values.len() as u32)
        .ok_or(BridgeError::OutOfBounds {
            address,
            len: u32::MAX,
            memory_size: memory.len(),
        })?;
    let range = span(memory.len(), address, total)?;

    let mut staged = Vec::with_capacity(total as usize);
    for &value in values {
        let (encoded, w) = encode(value, kind)?;
        staged.extend_from_slice(&encoded[..w]);
    }
    memory[range].copy_from_slice(&staged);
    Ok(())
}

/// Raw byte copy inside linear memory; source and destination may overlap
pub fn copy(memory: &mut [u8], dst: u32, src: u32, len: u32) -> Result<()> {
    let from = span(memory.len(), src, len)?;
    let to = span(memory.len(), dst, len)?;
    memory.copy_within(from, to.start);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(p: Primitive) -> TypeTag {
        TypeTag::Primitive(p)
    }

    #[test]
    fn signed_values_round_trip_per_width() {
        let mut mem = vec![0u8; 64];
        for (p, v) in [
            (Primitive::I8, -128),
            (Primitive::I16, -4),
            (Primitive::I32, i32::MIN as i64),
            (Primitive::I64, i64::MIN),
        ] {
            write(&mut mem, 8, Scalar::Int(v), &tag(p)).unwrap();
            assert_eq!(read(&mem, 8, &tag(p)).unwrap(), Scalar::Int(v), "{p:?}");
        }
    }

    #[test]
    fn unsigned_reads_zero_extend() {
        let mut mem = vec![0u8; 8];
        write(&mut mem, 0, Scalar::Int(0xFFFF), &tag(Primitive::U16)).unwrap();
        assert_eq!(read(&mem, 0, &tag(Primitive::U16)).unwrap(), Scalar::Int(0xFFFF));
        assert_eq!(read(&mem, 0, &tag(Primitive::I16)).unwrap(), Scalar::Int(-1));
    }

    #[test]
    fn little_endian_layout() {
        let mut mem = vec![0u8; 4];
        write(&mut mem, 0, Scalar::Int(0x0102_0304), &tag(Primitive::I32)).unwrap();
        assert_eq!(mem, [4, 3, 2, 1]);
    }

    #[test]
    fn floats() {
        let mut mem = vec![0u8; 16];
        write(&mut mem, 0, Scalar::Float(1.5), &tag(Primitive::F32)).unwrap();
        write(&mut mem, 4, Scalar::Float(-2.25), &tag(Primitive::F64)).unwrap();
        assert_eq!(read(&mem, 0, &tag(Primitive::F32)).unwrap(), Scalar::Float(1.5));
        assert_eq!(read(&mem, 4, &tag(Primitive::F64)).unwrap(), Scalar::Float(-2.25));
    }

    #[test]
    fn pointers_are_four_byte_addresses() {
        let mut mem = vec![0u8; 8];
        let ptr = TypeTag::pointer(TypeTag::structure("Tile"));
        write(&mut mem, 4, Scalar::Int(0xDEAD_BEEF), &ptr).unwrap();
        assert_eq!(read_address(&mem, 4).unwrap(), 0xDEAD_BEEF);
        assert_eq!(read(&mem, 4, &ptr).unwrap(), Scalar::Int(0xDEAD_BEEF));
    }

    #[test]
    fn out_of_range_is_rejected() {
        let mut mem = vec![0u8; 4];
        let err = write(&mut mem, 0, Scalar::Int(128), &tag(Primitive::I8)).unwrap_err();
        assert!(matches!(err, BridgeError::ValueOutOfRange { .. }));
        let err = write(&mut mem, 0, Scalar::Int(-1), &tag(Primitive::U32)).unwrap_err();
        assert!(matches!(err, BridgeError::ValueOutOfRange { .. }));
        assert_eq!(mem, [0, 0, 0, 0]);
    }

    #[test]
    fn struct_and_void_tags_fail_loudly() {
        let mut mem = vec![0u8; 4];
        for bad in [TypeTag::structure("Point"), TypeTag::Void] {
            assert!(matches!(read(&mem, 0, &bad), Err(BridgeError::InvalidTypeTag { .. })));
            assert!(matches!(
                write(&mut mem, 0, Scalar::Int(0), &bad),
                Err(BridgeError::InvalidTypeTag { .. })
            ));
        }
    }

    #[test]
    fn bounds_are_checked() {
        let mut mem = vec![0u8; 6];
        assert!(matches!(
            read(&mem, 4, &tag(Primitive::I32)),
            Err(BridgeError::OutOfBounds { address: 4, len: 4, .. })
        ));
        assert!(write(&mut mem, u32::MAX, Scalar::Int(0), &tag(Primitive::U8)).is_err());
    }

    #[test]
    fn bulk_write_is_contiguous_and_atomic() {
        let mut mem = vec![0u8; 8];
        let values = [Scalar::Int(1), Scalar::Int(-2), Scalar::Int(3)];
        write_bulk(&mut mem, 1, &values, &tag(Primitive::I16)).unwrap();
        assert_eq!(&mem[1..7], &[1, 0, 0xFE, 0xFF, 3, 0]);

        let mut fresh = vec![0u8; 8];
        let bad = [Scalar::Int(1), Scalar::Int(70_000)];
        assert!(write_bulk(&mut fresh, 0, &bad, &tag(Primitive::I16)).is_err());
        assert_eq!(fresh, vec![0u8; 8]);
    }

    #[test]
    fn copy_handles_overlap() {
        let mut mem = vec![1, 2, 3, 4, 0, 0];
        copy(&mut mem, 2, 0, 4).unwrap();
        assert_eq!(mem, [1, 2, 1, 2, 3, 4]);
        assert!(copy(&mut mem, 4, 0, 4).is_err());
    }
}
