// SPDX-License-Identifier: MIT

//! Tokenizer for the HID items of a report descriptor. Each item is decoded
//! into a typed [MainItem], [GlobalItem] or [LocalItem] together with its offset.
//! Interpretation of the resulting items (global state, local state,
//! collections) is left to [open_report_descriptor](crate::open_report_descriptor).
//!
//! In this document and unless stated otherwise, a reference to "Section a.b.c" refers to the
//! [HID Device Class Definition for HID 1.11](https://www.usb.org/document-library/device-class-definition-hid-111).
//!
//! # Walking the items
//!
//! [ReportDescriptorItems] is an iterator over the byte slice, it does not
//! allocate and it stops after the first malformed item:
//!
//! ```
//! # use hidpreparsed::hid::*;
//! # fn parse(bytes: &[u8]) -> Result<(), hidpreparsed::HidError> {
//! for rdesc_item in ReportDescriptorItems::new(bytes) {
//!     let rdesc_item = rdesc_item?;
//!     println!("Item at offset {:02x}", rdesc_item.offset());
//!     match rdesc_item.item_type() {
//!         ItemType::Main(MainItem::Output(_)) => println!("This is an output item"),
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::types::*;
use crate::{ensure, HidError};

use thiserror::Error;

/// Header byte of a long item, see Section 6.2.2.3.
const LONG_ITEM_HEADER: u8 = 0b11111110;

/// The little-endian payload of a short item, 0, 1, 2 or 4 bytes.
///
/// The number of bytes is kept around because whether a value is signed
/// can only be decided once the full item state is known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HidValue {
    value: u32,
    nbytes: usize,
}

impl HidValue {
    /// The payload length in bytes, the sign bit depends on it
    pub fn len(&self) -> usize {
        self.nbytes
    }

    pub fn is_empty(&self) -> bool {
        self.nbytes == 0
    }
}

impl TryFrom<&[u8]> for HidValue {
    type Error = ItemError;

    /// A zero-length slice is a valid item payload with the value 0.
    fn try_from(bytes: &[u8]) -> Result<HidValue> {
        let value = match *bytes {
            [] => 0,
            [b0] => b0 as u32,
            [b0, b1] => u16::from_le_bytes([b0, b1]) as u32,
            [b0, b1, b2, b3] => u32::from_le_bytes([b0, b1, b2, b3]),
            _ => {
                return Err(ItemError::InvalidData {
                    message: format!("Invalid data length {}", bytes.len()),
                })
            }
        };
        Ok(HidValue {
            value,
            nbytes: bytes.len(),
        })
    }
}

impl From<&HidValue> for u32 {
    fn from(v: &HidValue) -> u32 {
        v.value
    }
}

impl From<HidValue> for u32 {
    fn from(v: HidValue) -> u32 {
        u32::from(&v)
    }
}

impl From<&HidValue> for u16 {
    fn from(v: &HidValue) -> u16 {
        (v.value & 0xFFFF) as u16
    }
}

impl From<HidValue> for u16 {
    fn from(v: HidValue) -> u16 {
        u16::from(&v)
    }
}

impl From<&HidValue> for u8 {
    fn from(v: &HidValue) -> u8 {
        (v.value & 0xFF) as u8
    }
}

impl From<HidValue> for u8 {
    fn from(v: HidValue) -> u8 {
        u8::from(&v)
    }
}

impl From<&HidValue> for i32 {
    /// Sign-extends the value based on its length in bytes.
    fn from(v: &HidValue) -> i32 {
        match v.len() {
            0 => 0,
            1 => ((v.value & 0xFF) as i8) as i32,
            2 => ((v.value & 0xFFFF) as i16) as i32,
            _ => v.value as i32,
        }
    }
}

impl From<HidValue> for i32 {
    fn from(v: HidValue) -> i32 {
        i32::from(&v)
    }
}

/// Errors for a single item. The [ReportDescriptorItems] iterator
/// converts these into [HidError::InvalidDescriptor] with the offset
/// of the item.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ItemError {
    #[error("Invalid data: {message}")]
    InvalidData { message: String },
    #[error("Insufficient data")]
    InsufficientData,
}

type Result<T> = std::result::Result<T, ItemError>;

/// A decoded short item, or a marker for a long item.
///
/// [ItemType::Long] is a placeholder for a long item (Section 6.2.2.3), no long
/// item tags are defined and these are skipped by the parser.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ItemType {
    Main(MainItem),
    Global(GlobalItem),
    Local(LocalItem),
    Long,
}

/// Main Items, see Section 6.2.2.4. Input, Output and Feature create a
/// report field, Collection and End Collection group them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MainItem {
    Input(DataModes),
    Output(DataModes),
    Feature(DataModes),
    Collection(CollectionType),
    EndCollection,
}

/// Global Items, see Section 6.2.2.7. Each one updates the item state table
/// until overridden or restored by a Pop.
///
/// The logical and physical extents are kept as raw [HidValue] since their
/// signedness depends on the matching minimum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GlobalItem {
    UsagePage(UsagePage),
    LogicalMinimum(HidValue),
    LogicalMaximum(HidValue),
    PhysicalMinimum(HidValue),
    PhysicalMaximum(HidValue),
    UnitExponent(UnitExponent),
    Unit(Unit),
    ReportSize(ReportSize),
    ReportId(ReportId),
    ReportCount(ReportCount),
    Push,
    Pop,
    /// The value is the upper 6 bits of the header byte (`byte[0] & 0xFC`).
    Reserved {
        value: u8,
    },
}

/// Local Items, see Section 6.2.2.8. These only apply to the next [MainItem].
///
/// A Usage (or Usage Minimum/Maximum) with a 4-byte payload includes the Usage Page
/// in its upper 16 bits. Those are the `Extended*` variants, the others take their
/// Usage Page from the global state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocalItem {
    Usage(UsagePage, UsageId),
    UsageId(UsageId),
    UsageMinimum(UsageMinimum),
    ExtendedUsageMinimum(UsagePage, UsageMinimum),
    UsageMaximum(UsageMaximum),
    ExtendedUsageMaximum(UsagePage, UsageMaximum),
    DesignatorIndex(DesignatorIndex),
    DesignatorMinimum(DesignatorMinimum),
    DesignatorMaximum(DesignatorMaximum),
    StringIndex(StringIndex),
    StringMinimum(StringMinimum),
    StringMaximum(StringMaximum),
    Delimiter(Delimiter),
    /// The value is the upper 6 bits of the header byte (`byte[0] & 0xFC`).
    Reserved {
        value: u8,
    },
}

impl TryFrom<&[u8]> for ItemType {
    type Error = ItemError;

    fn try_from(bytes: &[u8]) -> Result<ItemType> {
        ensure!(!bytes.is_empty(), ItemError::InsufficientData);
        match (bytes[0] & 0b1100) >> 2 {
            0 => Ok(ItemType::Main(MainItem::try_from(bytes)?)),
            1 => Ok(ItemType::Global(GlobalItem::try_from(bytes)?)),
            2 => Ok(ItemType::Local(LocalItem::try_from(bytes)?)),
            _ => Err(ItemError::InvalidData {
                message: format!("Reserved item type in header {:#04x}", bytes[0]),
            }),
        }
    }
}

impl TryFrom<&[u8]> for MainItem {
    type Error = ItemError;

    fn try_from(bytes: &[u8]) -> Result<MainItem> {
        ensure!(!bytes.is_empty(), ItemError::InsufficientData);
        let value = HidValue::try_from(&bytes[1..])?;
        let tag = bytes[0] & 0b11111100;
        match tag {
            0b10000000 => Ok(MainItem::Input(DataModes(value.into()))),
            0b10010000 => Ok(MainItem::Output(DataModes(value.into()))),
            0b10110000 => Ok(MainItem::Feature(DataModes(value.into()))),
            0b10100000 => {
                ensure!(
                    u32::from(&value) <= 0xff,
                    ItemError::InvalidData {
                        message: format!("Collection type {} out of range", u32::from(&value)),
                    }
                );
                Ok(MainItem::Collection(CollectionType::from(u8::from(value))))
            }
            0b11000000 => Ok(MainItem::EndCollection),
            _ => Err(ItemError::InvalidData {
                message: format!("Invalid item tag {tag:#010b}"),
            }),
        }
    }
}

impl TryFrom<&[u8]> for GlobalItem {
    type Error = ItemError;

    fn try_from(bytes: &[u8]) -> Result<GlobalItem> {
        ensure!(!bytes.is_empty(), ItemError::InsufficientData);
        let value = HidValue::try_from(&bytes[1..])?;
        let item = match bytes[0] & 0b11111100 {
            0b00000100 => GlobalItem::UsagePage(UsagePage(value.into())),
            0b00010100 => GlobalItem::LogicalMinimum(value),
            0b00100100 => GlobalItem::LogicalMaximum(value),
            0b00110100 => GlobalItem::PhysicalMinimum(value),
            0b01000100 => GlobalItem::PhysicalMaximum(value),
            0b01010100 => GlobalItem::UnitExponent(UnitExponent(value.into())),
            0b01100100 => GlobalItem::Unit(Unit(value.into())),
            0b01110100 => GlobalItem::ReportSize(ReportSize(value.into())),
            0b10000100 => {
                ensure!(
                    u32::from(&value) <= 0xff,
                    ItemError::InvalidData {
                        message: format!("Report ID {} out of range", u32::from(&value)),
                    }
                );
                GlobalItem::ReportId(ReportId(value.into()))
            }
            0b10010100 => GlobalItem::ReportCount(ReportCount(value.into())),
            0b10100100 => GlobalItem::Push,
            0b10110100 => GlobalItem::Pop,
            value => GlobalItem::Reserved { value },
        };

        Ok(item)
    }
}

impl TryFrom<&[u8]> for LocalItem {
    type Error = ItemError;

    fn try_from(bytes: &[u8]) -> Result<LocalItem> {
        ensure!(!bytes.is_empty(), ItemError::InsufficientData);
        let value = HidValue::try_from(&bytes[1..])?;
        let extended = value.len() == 4;
        let page = UsagePage((u32::from(&value) >> 16) as u16);
        let item = match bytes[0] & 0b11111100 {
            0b00001000 if extended => LocalItem::Usage(page, UsageId(value.into())),
            0b00001000 => LocalItem::UsageId(UsageId(value.into())),
            0b00011000 if extended => {
                LocalItem::ExtendedUsageMinimum(page, UsageMinimum(value.into()))
            }
            0b00011000 => LocalItem::UsageMinimum(UsageMinimum(value.into())),
            0b00101000 if extended => {
                LocalItem::ExtendedUsageMaximum(page, UsageMaximum(value.into()))
            }
            0b00101000 => LocalItem::UsageMaximum(UsageMaximum(value.into())),
            0b00111000 => LocalItem::DesignatorIndex(DesignatorIndex(value.into())),
            0b01001000 => LocalItem::DesignatorMinimum(DesignatorMinimum(value.into())),
            0b01011000 => LocalItem::DesignatorMaximum(DesignatorMaximum(value.into())),
            0b01111000 => LocalItem::StringIndex(StringIndex(value.into())),
            0b10001000 => LocalItem::StringMinimum(StringMinimum(value.into())),
            0b10011000 => LocalItem::StringMaximum(StringMaximum(value.into())),
            0b10101000 => LocalItem::Delimiter(Delimiter(value.into())),
            value => LocalItem::Reserved { value },
        };

        Ok(item)
    }
}

/// One item of a report descriptor, borrowing its bytes from the descriptor.
#[derive(Debug, Clone, Copy)]
pub struct ReportDescriptorItem<'a> {
    offset: usize,
    item_type: ItemType,
    bytes: &'a [u8],
}

impl<'a> ReportDescriptorItem<'a> {
    /// Byte offset of the header within the report descriptor
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn item_type(&self) -> ItemType {
        self.item_type
    }

    /// The length of this item in bytes, inclusive of the header byte.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// The header byte of this item. For long items this is
    /// always `0xfe`.
    pub fn header(&self) -> u8 {
        self.bytes[0]
    }

    /// Returns true if this item is a Long Item (Section 6.2.2.3).
    pub fn is_long_item(&self) -> bool {
        matches!(self.item_type, ItemType::Long)
    }

    /// The tag of this item. For short items this is the upper 4 bits of the
    /// header byte shifted down, for long items the long item tag byte.
    pub fn tag(&self) -> u8 {
        if self.is_long_item() {
            self.bytes[2]
        } else {
            (self.header() & 0b11110000) >> 4
        }
    }

    /// Header and payload
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// The item's data bytes, possibly empty.
    pub fn data(&self) -> &'a [u8] {
        if self.is_long_item() {
            &self.bytes[3..]
        } else {
            &self.bytes[1..]
        }
    }
}

/// Extract the item at the start of `bytes`.
fn next_item(bytes: &[u8]) -> Result<(ItemType, usize)> {
    ensure!(!bytes.is_empty(), ItemError::InsufficientData);
    if bytes[0] == LONG_ITEM_HEADER {
        ensure!(bytes.len() >= 3, ItemError::InsufficientData);
        let size = bytes[1] as usize + 3;
        ensure!(bytes.len() >= size, ItemError::InsufficientData);
        return Ok((ItemType::Long, size));
    }

    let size = match bytes[0] & 0b11 {
        0 => 0,
        1 => 1,
        2 => 2,
        _ => 4,
    };
    ensure!(bytes.len() > size, ItemError::InsufficientData);
    let itype = ItemType::try_from(&bytes[0..size + 1])?;
    Ok((itype, size + 1))
}

/// An iterator over the items of a report descriptor byte array. This is the
/// result of splitting a report descriptor without *interpreting* it.
///
/// Iteration ends after the first error.
#[derive(Debug, Clone)]
pub struct ReportDescriptorItems<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ReportDescriptorItems<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        ReportDescriptorItems { bytes, offset: 0 }
    }
}

impl<'a> Iterator for ReportDescriptorItems<'a> {
    type Item = crate::Result<ReportDescriptorItem<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.bytes.len() {
            return None;
        }

        let offset = self.offset;
        let remainder = &self.bytes[offset..];
        match next_item(remainder) {
            Ok((item_type, size)) => {
                self.offset += size;
                Some(Ok(ReportDescriptorItem {
                    offset,
                    item_type,
                    bytes: &remainder[..size],
                }))
            }
            Err(e) => {
                self.offset = self.bytes.len();
                Some(Err(HidError::InvalidDescriptor {
                    offset,
                    message: format!("{e}"),
                }))
            }
        }
    }
}
