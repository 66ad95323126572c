// SPDX-License-Identifier: MIT

//! Standalone HID types that exist for type safety only.
//! These are all simple wrappers around their underlying integer data type.
//!
//! In this document and unless stated otherwise, a reference to "Section a.b.c" refers to the
//! [HID Device Class Definition for HID 1.11](https://www.usb.org/document-library/device-class-definition-hid-111).

#[cfg(feature = "hut")]
use hut::{AsUsage, AsUsagePage};

/// Creates a `From<Foo> for u32` and `From<u32> for Foo` implementation for the given `Foo` type.
/// Use like this: `impl_from(Foo, Foo, u32)`.
macro_rules! impl_from {
    ($tipo:ty, $tipo_expr:expr, $to:ty) => {
        impl From<$tipo> for $to {
            fn from(f: $tipo) -> $to {
                f.0
            }
        }
        impl From<&$tipo> for $to {
            fn from(f: &$tipo) -> $to {
                f.0
            }
        }
        impl From<$to> for $tipo {
            fn from(f: $to) -> Self {
                $tipo_expr(f)
            }
        }
    };
}

/// Creates a `impl Display for Foo` that just converts into the underlying number.
/// Use like this: `impl_fmt(Foo, u32)`.
macro_rules! impl_fmt {
    ($tipo:ty, $to:ty) => {
        impl std::fmt::Display for $tipo {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let v: $to = self.into();
                write!(f, "{v}")
            }
        }
    };
}

// ---------- GLOBAL ITEMS ---------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct UsagePage(pub u16);

impl_from!(UsagePage, UsagePage, u16);
impl_fmt!(UsagePage, u16);

#[cfg(feature = "hut")]
impl From<&hut::UsagePage> for UsagePage {
    fn from(hut: &hut::UsagePage) -> UsagePage {
        UsagePage(hut.usage_page_value())
    }
}

#[cfg(feature = "hut")]
impl From<hut::UsagePage> for UsagePage {
    fn from(hut: hut::UsagePage) -> UsagePage {
        UsagePage::from(&hut)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogicalMinimum(pub i32);

impl_from!(LogicalMinimum, LogicalMinimum, i32);
impl_fmt!(LogicalMinimum, i32);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogicalMaximum(pub i32);

impl_from!(LogicalMaximum, LogicalMaximum, i32);
impl_fmt!(LogicalMaximum, i32);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhysicalMinimum(pub i32);

impl_from!(PhysicalMinimum, PhysicalMinimum, i32);
impl_fmt!(PhysicalMinimum, i32);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhysicalMaximum(pub i32);

impl_from!(PhysicalMaximum, PhysicalMaximum, i32);
impl_fmt!(PhysicalMaximum, i32);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Unit(pub u32);

impl_from!(Unit, Unit, u32);
impl_fmt!(Unit, u32);

/// The raw Unit Exponent value as found in the report descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitExponent(pub u32);

impl_from!(UnitExponent, UnitExponent, u32);
impl_fmt!(UnitExponent, u32);

impl UnitExponent {
    /// The base-10 exponent. Section 6.2.2.7 encodes the exponent as a
    /// signed 4-bit nibble (`0x0F` is -1), larger values are taken as
    /// a plain signed byte.
    pub fn exponent(&self) -> i8 {
        match self.0 {
            v @ 0..=0x7 => v as i8,
            v @ 0x8..=0xf => (v as i8) - 16,
            v => (v & 0xff) as u8 as i8,
        }
    }
}

/// The size of a single field in bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSize(pub u32);

impl_from!(ReportSize, ReportSize, u32);
impl_fmt!(ReportSize, u32);

/// A report ID. Section 6.2.2.7 reserves ID 0, so a [ReportId] is always nonzero
/// once it came out of the parser.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReportId(pub u8);

impl_from!(ReportId, ReportId, u8);
impl_fmt!(ReportId, u8);

/// The number of fields in a single main item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportCount(pub u32);

impl_from!(ReportCount, ReportCount, u32);
impl_fmt!(ReportCount, u32);

// ----------------- LOCAL ITEMS --------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct UsageId(pub u16);

impl_from!(UsageId, UsageId, u16);
impl_fmt!(UsageId, u16);

#[cfg(feature = "hut")]
impl From<&hut::Usage> for UsageId {
    fn from(hut: &hut::Usage) -> UsageId {
        UsageId(hut.usage_id_value())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageMinimum(pub u16);

impl_from!(UsageMinimum, UsageMinimum, u16);
impl_fmt!(UsageMinimum, u16);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageMaximum(pub u16);

impl_from!(UsageMaximum, UsageMaximum, u16);
impl_fmt!(UsageMaximum, u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringIndex(pub u32);

impl_from!(StringIndex, StringIndex, u32);
impl_fmt!(StringIndex, u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringMinimum(pub u32);

impl_from!(StringMinimum, StringMinimum, u32);
impl_fmt!(StringMinimum, u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringMaximum(pub u32);

impl_from!(StringMaximum, StringMaximum, u32);
impl_fmt!(StringMaximum, u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesignatorIndex(pub u32);

impl_from!(DesignatorIndex, DesignatorIndex, u32);
impl_fmt!(DesignatorIndex, u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesignatorMinimum(pub u32);

impl_from!(DesignatorMinimum, DesignatorMinimum, u32);
impl_fmt!(DesignatorMinimum, u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesignatorMaximum(pub u32);

impl_from!(DesignatorMaximum, DesignatorMaximum, u32);
impl_fmt!(DesignatorMaximum, u32);

/// Delimiter data: 1 opens a set, 0 closes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiter(pub u32);

impl_from!(Delimiter, Delimiter, u32);
impl_fmt!(Delimiter, u32);

impl Delimiter {
    pub fn is_open(&self) -> bool {
        self.0 == 1
    }
}

// ----------------- MAIN ITEMS --------------------

/// Convenience function to be extract a single bit as bool from a value
fn bit(bits: u32, bit: u8) -> bool {
    bits & (1 << bit) != 0
}

/// The data bits of an Input, Output or Feature item, see Section 6.2.2.5.
///
/// Bit 7 is the volatile bit for Output and Feature items and reserved
/// for Input items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataModes(pub u32);

impl_from!(DataModes, DataModes, u32);

impl std::fmt::Display for DataModes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{},{},{}",
            if self.is_constant() { "Cnst" } else { "Data" },
            if self.is_array() { "Arr" } else { "Var" },
            if self.is_relative() { "Rel" } else { "Abs" },
        )
    }
}

impl DataModes {
    pub const CONSTANT: u32 = 1 << 0;
    pub const VARIABLE: u32 = 1 << 1;
    pub const RELATIVE: u32 = 1 << 2;
    pub const WRAP: u32 = 1 << 3;
    pub const NONLINEAR: u32 = 1 << 4;
    pub const NO_PREFERRED: u32 = 1 << 5;
    pub const NULL_STATE: u32 = 1 << 6;
    pub const VOLATILE: u32 = 1 << 7;
    pub const BUFFERED_BYTES: u32 = 1 << 8;

    /// True if the data is constant and never changes. Constant fields without
    /// a usage are padding.
    pub fn is_constant(&self) -> bool {
        bit(self.0, 0)
    }

    /// True if the field carries data.
    pub fn is_data(&self) -> bool {
        !self.is_constant()
    }

    /// True if each field is a variable of its own.
    pub fn is_variable(&self) -> bool {
        bit(self.0, 1)
    }

    /// True if the fields form an array of usage selectors. This is the
    /// absence of the variable bit.
    pub fn is_array(&self) -> bool {
        !self.is_variable()
    }

    pub fn is_relative(&self) -> bool {
        bit(self.0, 2)
    }

    pub fn is_absolute(&self) -> bool {
        !self.is_relative()
    }

    pub fn wraps(&self) -> bool {
        bit(self.0, 3)
    }

    pub fn is_nonlinear(&self) -> bool {
        bit(self.0, 4)
    }

    pub fn has_no_preferred_state(&self) -> bool {
        bit(self.0, 5)
    }

    pub fn has_null_state(&self) -> bool {
        bit(self.0, 6)
    }

    /// Only meaningful for Output and Feature items.
    pub fn is_volatile(&self) -> bool {
        bit(self.0, 7)
    }

    pub fn is_buffered_bytes(&self) -> bool {
        bit(self.0, 8)
    }
}

/// The data of a Collection item, see Section 6.2.2.6.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CollectionType {
    #[default]
    Physical,
    Application,
    Logical,
    Report,
    NamedArray,
    UsageSwitch,
    UsageModifier,
    Reserved {
        value: u8,
    },
    VendorDefined {
        value: u8,
    },
}

impl From<u8> for CollectionType {
    fn from(v: u8) -> CollectionType {
        match v {
            0x00 => CollectionType::Physical,
            0x01 => CollectionType::Application,
            0x02 => CollectionType::Logical,
            0x03 => CollectionType::Report,
            0x04 => CollectionType::NamedArray,
            0x05 => CollectionType::UsageSwitch,
            0x06 => CollectionType::UsageModifier,
            value @ 0x07..=0x7f => CollectionType::Reserved { value },
            value @ 0x80..=0xff => CollectionType::VendorDefined { value },
        }
    }
}

impl From<&CollectionType> for u8 {
    fn from(c: &CollectionType) -> u8 {
        match c {
            CollectionType::Physical => 0x00,
            CollectionType::Application => 0x01,
            CollectionType::Logical => 0x02,
            CollectionType::Report => 0x03,
            CollectionType::NamedArray => 0x04,
            CollectionType::UsageSwitch => 0x05,
            CollectionType::UsageModifier => 0x06,
            CollectionType::Reserved { value } => *value,
            CollectionType::VendorDefined { value } => *value,
        }
    }
}

impl From<CollectionType> for u8 {
    fn from(c: CollectionType) -> u8 {
        u8::from(&c)
    }
}
