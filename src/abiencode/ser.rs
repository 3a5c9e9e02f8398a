//! Solidity `abi.encode` as a [serde::Serializer].
//!
//! Every value is written as a sequence of 32 byte slots. Static values are
//! written in place (head), dynamic values are referenced by an offset in the
//! head and written after all static values (tail). Because offsets depend on
//! the size of everything that comes before them, the serializer visits each
//! value multiple times, once per [Pass].

use super::error::{Error, Result};
use alloc::vec::Vec;
use serde::{
    ser::{self, Impossible, SerializeSeq, SerializeStruct, SerializeTuple, SerializeTupleStruct},
    Serialize,
};

/// Type name used for marking a struct as fake-dynamic (dynamic but
/// transparent). The characters have no special meaning, they are chosen so
/// that no normal Rust type will ever have this name.
const MARK_DYNAMIC_NAME: &str = ":$&_DYNAMIC";

/// Size of a single abi slot in bytes.
pub const SLOT_SIZE: usize = 32;

/// PhantomData type to mark a struct/tuple as dynamic, even if none of its
/// fields are.
///
/// The serde data model cannot express `bytes` and `bytes32` at the same time:
/// fixed-size bytes have to be able to write raw slots via
/// [serialize_bytes][serde::Serializer::serialize_bytes]. `bytes` is therefore
/// serialized as a tuple (see [as_bytes][super::as_bytes]) of
/// - a [DynamicMarker], making the tuple dynamic without an additional
///   indirection for its own fields,
/// - the length (number of bytes without padding),
/// - the data, padded to [SLOT_SIZE].
///
/// # Important
/// When used wrong the resulting bytes may not represent anything in
/// Solidity. Prefer [as_bytes][super::as_bytes].
pub struct DynamicMarker;

impl Serialize for DynamicMarker {
    fn serialize<S>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_unit_struct(MARK_DYNAMIC_NAME)
    }
}

/// Destination of the encoded slots.
pub trait Writer {
    fn write(&mut self, slot: &[u8]);
}

impl Writer for Vec<u8> {
    fn write(&mut self, slot: &[u8]) {
        self.extend_from_slice(slot);
    }
}

/// Used during the dry runs, which must never produce output.
struct NoWriter;

impl Writer for NoWriter {
    fn write(&mut self, _: &[u8]) {
        panic!("do not write to a NoWriter!");
    }
}

#[derive(Debug, Clone, Copy)]
enum Pass {
    /// Don't write anything, compute the size of the head and whether the
    /// value is dynamic.
    HeadSize(usize),
    /// Write the static part. `offset` is where the next dynamic value starts,
    /// relative to the beginning of the enclosing head.
    Head { offset: usize },
    /// Don't write anything, compute the size of the tail.
    TailSize(usize),
    /// Write the dynamic part.
    Tail,
}

/// Shape of a value as seen by its parent.
#[derive(Debug, Clone, Copy)]
struct Layout {
    head_size: usize,
    is_dynamic: bool,
    is_fake_dynamic: bool,
}

impl Layout {
    /// The value lives in the tail and is referenced by an offset.
    fn is_indirect(&self) -> bool {
        self.is_dynamic && !self.is_fake_dynamic
    }

    fn size_in_parent_head(&self) -> usize {
        if self.is_indirect() {
            SLOT_SIZE
        } else {
            self.head_size
        }
    }
}

/// Sequences count offsets from their first element, tuples from their
/// first field, which is why the serializer has to know where it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Tuple,
    Seq,
}

pub struct Serializer<'a, W>
where
    W: Writer,
{
    writer: &'a mut W,
    pass: Pass,
    is_dynamic: bool,
    is_fake_dynamic: bool,
}

/// Equivalent of `abi.encode(value)`.
///
/// Dynamic values are prefixed with the offset of the value itself (`0x20`),
/// exactly like Solidity does.
pub fn to_writer<T, W>(value: &T, writer: &mut W) -> Result<()>
where
    T: Serialize + ?Sized,
    W: Writer,
{
    to_writer_internal(value, writer, true)
}

/// Equivalent of `abi.encode(a, b, ...)` where the fields of `value` are the
/// arguments.
///
/// Unlike [to_writer] this never writes the offset of the outer tuple.
pub fn to_args_writer<T, W>(value: &T, writer: &mut W) -> Result<()>
where
    T: Serialize + ?Sized,
    W: Writer,
{
    to_writer_internal(value, writer, false)
}

pub fn to_vec<T>(value: &T) -> Result<Vec<u8>>
where
    T: Serialize + ?Sized,
{
    let mut buf = Vec::new();
    to_writer(value, &mut buf)?;
    Ok(buf)
}

pub fn to_args_vec<T>(value: &T) -> Result<Vec<u8>>
where
    T: Serialize + ?Sized,
{
    let mut buf = Vec::new();
    to_args_writer(value, &mut buf)?;
    Ok(buf)
}

fn to_writer_internal<T, W>(value: &T, writer: &mut W, include_outer_offset: bool) -> Result<()>
where
    T: Serialize + ?Sized,
    W: Writer,
{
    let layout = layout_of(value)?;
    tracing::trace!(?layout, include_outer_offset, "abi encoding value");

    let mut serializer = Serializer {
        writer,
        pass: Pass::Head {
            offset: layout.head_size,
        },
        is_dynamic: layout.is_dynamic,
        is_fake_dynamic: layout.is_fake_dynamic,
    };

    if layout.is_dynamic && include_outer_offset {
        serializer.write_right_aligned(SLOT_SIZE.to_be_bytes());
    }

    value.serialize(&mut serializer)?;
    if layout.is_dynamic {
        serializer.pass = Pass::Tail;
        value.serialize(&mut serializer)?;
    }
    Ok(())
}

fn layout_of<T>(value: &T) -> Result<Layout>
where
    T: Serialize + ?Sized,
{
    let mut serializer = Serializer {
        writer: &mut NoWriter,
        pass: Pass::HeadSize(0),
        is_dynamic: false,
        is_fake_dynamic: false,
    };
    value.serialize(&mut serializer)?;

    match serializer.pass {
        Pass::HeadSize(head_size) => Ok(Layout {
            head_size,
            is_dynamic: serializer.is_dynamic,
            is_fake_dynamic: serializer.is_fake_dynamic,
        }),
        _ => unreachable!("the serializer never changes the pass of a dry run"),
    }
}

fn tail_size_of<T>(value: &T) -> Result<usize>
where
    T: Serialize + ?Sized,
{
    let mut serializer = Serializer {
        writer: &mut NoWriter,
        pass: Pass::TailSize(0),
        is_dynamic: false,
        is_fake_dynamic: false,
    };
    value.serialize(&mut serializer)?;

    match serializer.pass {
        Pass::TailSize(tail_size) => Ok(tail_size),
        _ => unreachable!("the serializer never changes the pass of a dry run"),
    }
}

impl<'a, W> Serializer<'a, W>
where
    W: Writer,
{
    // Panics if v.len() > SLOT_SIZE
    fn write_left_aligned_slice(&mut self, v: &[u8]) {
        let mut bytes = [0u8; SLOT_SIZE];
        bytes[..v.len()].copy_from_slice(v);
        self.writer.write(bytes.as_slice());
    }

    // Panics if N > SLOT_SIZE
    fn write_right_aligned<const N: usize>(&mut self, v: [u8; N]) {
        self.write_signed(false, v)
    }

    // Panics if N > SLOT_SIZE
    fn write_signed<const N: usize>(&mut self, negative: bool, v: [u8; N]) {
        let filler = if negative { 0xff } else { 0x00 };
        let mut bytes = [filler; SLOT_SIZE];
        bytes[SLOT_SIZE - N..].copy_from_slice(v.as_slice());
        self.writer.write(bytes.as_slice())
    }

    /// Write all full slots and the zero padded remainder, if any.
    fn write_padded(&mut self, v: &[u8]) {
        let iter = v.chunks_exact(SLOT_SIZE);
        let rem = iter.remainder();
        for chunk in iter {
            self.writer.write(chunk);
        }
        if !rem.is_empty() {
            self.write_left_aligned_slice(rem);
        }
    }

    /// Any value that fits into a single slot.
    fn scalar<const N: usize>(&mut self, negative: bool, v: [u8; N]) -> Result<()> {
        match self.pass {
            Pass::HeadSize(ref mut head_size) => *head_size += SLOT_SIZE,
            Pass::Head { .. } => self.write_signed(negative, v),
            Pass::TailSize(_) | Pass::Tail => {}
        }
        Ok(())
    }

    fn serialize_with<T>(&mut self, value: &T, pass: Pass) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let layout = layout_of(value)?;
        let mut serializer = Serializer {
            writer: &mut *self.writer,
            pass,
            is_dynamic: layout.is_dynamic,
            is_fake_dynamic: layout.is_fake_dynamic,
        };
        value.serialize(&mut serializer)
    }

    /// Shared by all compound types: static elements are written entirely in
    /// Pass::Head, dynamic ones leave an offset in Pass::Head and are written
    /// in Pass::Tail.
    fn write_element<T>(&mut self, container: Container, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let layout = layout_of(value)?;
        match self.pass {
            Pass::HeadSize(ref mut head_size) => {
                *head_size += layout.size_in_parent_head();
                if container == Container::Tuple {
                    self.is_dynamic |= layout.is_dynamic || layout.is_fake_dynamic;
                }
            }
            Pass::Head { offset } => {
                if layout.is_indirect() {
                    // The length of an array is not part of the offsets of
                    // its elements.
                    let relative = match container {
                        Container::Tuple => offset,
                        Container::Seq => offset - SLOT_SIZE,
                    };
                    self.write_right_aligned(relative.to_be_bytes());
                    self.pass = Pass::Head {
                        offset: offset + layout.head_size + tail_size_of(value)?,
                    };
                } else {
                    let offset = match container {
                        Container::Tuple => offset,
                        Container::Seq => layout.head_size,
                    };
                    self.serialize_with(value, Pass::Head { offset })?;
                }
            }
            Pass::TailSize(size) => {
                let own_head = if layout.is_indirect() {
                    layout.head_size
                } else {
                    0
                };
                self.pass = Pass::TailSize(size + own_head + tail_size_of(value)?);
            }
            Pass::Tail => {
                if layout.is_indirect() {
                    // The offset does not concern the sequence this element
                    // is part of but the children of the element: they need
                    // to know where the element's own tail begins.
                    self.serialize_with(
                        value,
                        Pass::Head {
                            offset: layout.head_size,
                        },
                    )?;
                    self.serialize_with(value, Pass::Tail)?;
                }
            }
        }
        Ok(())
    }
}

impl<'a, 'b, W> ser::Serializer for &'a mut Serializer<'b, W>
where
    W: Writer,
{
    type Ok = ();
    type Error = Error;

    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Impossible<(), Error>;
    type SerializeMap = Impossible<(), Error>;
    type SerializeStruct = Self;
    type SerializeStructVariant = Impossible<(), Error>;

    fn is_human_readable(&self) -> bool {
        false
    }

    fn serialize_bool(self, v: bool) -> Result<()> {
        self.serialize_u8(u8::from(v))
    }

    fn serialize_i8(self, v: i8) -> Result<()> {
        self.scalar(v < 0, v.to_be_bytes())
    }

    fn serialize_i16(self, v: i16) -> Result<()> {
        self.scalar(v < 0, v.to_be_bytes())
    }

    fn serialize_i32(self, v: i32) -> Result<()> {
        self.scalar(v < 0, v.to_be_bytes())
    }

    fn serialize_i64(self, v: i64) -> Result<()> {
        self.scalar(v < 0, v.to_be_bytes())
    }

    fn serialize_i128(self, v: i128) -> Result<()> {
        self.scalar(v < 0, v.to_be_bytes())
    }

    fn serialize_u8(self, v: u8) -> Result<()> {
        self.scalar(false, v.to_be_bytes())
    }

    fn serialize_u16(self, v: u16) -> Result<()> {
        self.scalar(false, v.to_be_bytes())
    }

    fn serialize_u32(self, v: u32) -> Result<()> {
        self.scalar(false, v.to_be_bytes())
    }

    fn serialize_u64(self, v: u64) -> Result<()> {
        self.scalar(false, v.to_be_bytes())
    }

    fn serialize_u128(self, v: u128) -> Result<()> {
        self.scalar(false, v.to_be_bytes())
    }

    fn serialize_f32(self, _: f32) -> Result<()> {
        Err(Error::TypeNotRepresentable("f32"))
    }

    fn serialize_f64(self, _: f64) -> Result<()> {
        Err(Error::TypeNotRepresentable("f64"))
    }

    fn serialize_char(self, _: char) -> Result<()> {
        Err(Error::TypeNotYetSupported("char"))
    }

    fn serialize_str(self, v: &str) -> Result<()> {
        // Same as `bytes`, but without the DynamicMarker tuple.
        match self.pass {
            Pass::HeadSize(_) => self.is_dynamic = true,
            Pass::Head { .. } => {}
            Pass::TailSize(ref mut size) => *size += SLOT_SIZE + padded_len(v.len()),
            Pass::Tail => {
                self.write_right_aligned(v.len().to_be_bytes());
                self.write_padded(v.as_bytes());
            }
        }
        Ok(())
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<()> {
        // Raw slots, see DynamicMarker for dynamic length `bytes`.
        match self.pass {
            Pass::HeadSize(ref mut head_size) => *head_size += padded_len(v.len()),
            Pass::Head { .. } => self.write_padded(v),
            Pass::TailSize(_) | Pass::Tail => {}
        }
        Ok(())
    }

    fn serialize_none(self) -> Result<()> {
        Err(Error::TypeNotRepresentable("none"))
    }

    fn serialize_some<T: ?Sized>(self, _: &T) -> Result<()>
    where
        T: Serialize,
    {
        Err(Error::TypeNotRepresentable("some"))
    }

    fn serialize_unit(self) -> Result<()> {
        Err(Error::TypeNotRepresentable("unit"))
    }

    fn serialize_unit_struct(self, name: &'static str) -> Result<()> {
        if name != MARK_DYNAMIC_NAME {
            return Err(Error::TypeNotRepresentable("unit struct"));
        }
        if let Pass::HeadSize(_) = self.pass {
            self.is_fake_dynamic = true;
        }
        Ok(())
    }

    fn serialize_unit_variant(self, _: &'static str, _: u32, _: &'static str) -> Result<()> {
        // Use serde_repr or a custom Serialize impl to write enums as uint8.
        Err(Error::TypeNotRepresentable("unit variant (enum)"))
    }

    fn serialize_newtype_struct<T: ?Sized>(self, _name: &'static str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        self.write_element(Container::Tuple, value)
    }

    fn serialize_newtype_variant<T: ?Sized>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: &T,
    ) -> Result<()>
    where
        T: Serialize,
    {
        Err(Error::TypeNotRepresentable("newtype variant (enum)"))
    }

    fn serialize_seq(self, size: Option<usize>) -> Result<Self::SerializeSeq> {
        // Dynamic arrays need their length in advance, there is no way to
        // write it after the elements.
        let size = size.ok_or(Error::TypeNotRepresentable("sequence of unknown length"))?;
        match self.pass {
            Pass::HeadSize(ref mut head_size) => {
                self.is_dynamic = true;
                *head_size += SLOT_SIZE;
            }
            Pass::Head { .. } => self.write_right_aligned(size.to_be_bytes()),
            Pass::TailSize(_) | Pass::Tail => {}
        }
        Ok(self)
    }

    fn serialize_tuple(self, _: usize) -> Result<Self::SerializeTuple> {
        Ok(self)
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(Error::TypeNotRepresentable("tuple variant (enum)"))
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Self::SerializeMap> {
        Err(Error::TypeNotRepresentable("map"))
    }

    fn serialize_struct(self, _: &'static str, _: usize) -> Result<Self::SerializeStruct> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(Error::TypeNotRepresentable("struct variant"))
    }

    fn collect_str<T: ?Sized>(self, _value: &T) -> Result<()>
    where
        T: core::fmt::Display,
    {
        Err(Error::TypeNotYetSupported("Display as string"))
    }
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(SLOT_SIZE) * SLOT_SIZE
}

impl<'a, 'b, W> SerializeSeq for &'a mut Serializer<'b, W>
where
    W: Writer,
{
    type Ok = ();
    type Error = Error;

    fn serialize_element<T: ?Sized>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        self.write_element(Container::Seq, value)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl<'a, 'b, W> SerializeTuple for &'a mut Serializer<'b, W>
where
    W: Writer,
{
    type Ok = ();
    type Error = Error;

    fn serialize_element<T: ?Sized>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        self.write_element(Container::Tuple, value)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl<'a, 'b, W> SerializeTupleStruct for &'a mut Serializer<'b, W>
where
    W: Writer,
{
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        self.write_element(Container::Tuple, value)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl<'a, 'b, W> SerializeStruct for &'a mut Serializer<'b, W>
where
    W: Writer,
{
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized>(&mut self, _name: &'static str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        self.write_element(Container::Tuple, value)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}
