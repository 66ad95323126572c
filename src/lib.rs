// SPDX-License-Identifier: MIT

//! This crate turns a HID Report Descriptor into preparsed data: flat tables
//! of report items, usages, strings, designators and collections, plus the
//! per-report sizes. See [open_report_descriptor].
//!
//! ```
//! # use hidpreparsed::*;
//! # fn parse(bytes: &[u8]) -> Result<(), HidError> {
//! let data = open_report_descriptor(bytes, 0)?;
//! for item in data.report_items() {
//!     if is_button(item, &data) {
//!         println!("{} buttons", usage_count(item, &data));
//!     }
//! }
//! close_report_descriptor(data)?;
//! # Ok(())
//! # }
//! ```
//!
//! The tables are sized by a counting pass over the descriptor before the
//! parsing pass fills them, no table grows while parsing.
//!
//! In this document and unless stated otherwise, a reference to "Section a.b.c" refers to the
//! [HID Device Class Definition for HID 1.11](https://www.usb.org/document-library/device-class-definition-hid-111).

use log::debug;
use thiserror::Error;

pub mod hid;
mod parser;
pub mod types;

pub use types::*;

/// Returns `Err($err)` from the calling function unless `$cond` holds.
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err);
        }
    };
}
pub(crate) use ensure;

/// Marks a [PreparsedData] that holds tables.
const PREPARSED_DATA_TAG: u32 = u32::from_be_bytes(*b"hidp");

#[derive(Error, Debug, PartialEq, Eq)]
pub enum HidError {
    #[error("Missing report descriptor")]
    NullPointer,
    #[error("Not enough memory for the preparsed data")]
    NotEnoughMemory,
    #[error("Invalid report descriptor at offset {offset}: {message}")]
    InvalidDescriptor { offset: usize, message: String },
    #[error("Invalid preparsed data")]
    InvalidPreparsedData,
}

type Result<T> = std::result::Result<T, HidError>;

/// Bounds applied while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserLimits {
    /// The maximum number of nested collections
    pub max_collection_depth: usize,
    /// The maximum number of Push items without a matching Pop
    pub max_global_stack_depth: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        ParserLimits {
            max_collection_depth: 32,
            max_global_stack_depth: 16,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ReportType {
    #[default]
    Input,
    Output,
    Feature,
}

impl ReportType {
    pub(crate) fn index(&self) -> usize {
        match self {
            ReportType::Input => 0,
            ReportType::Output => 1,
            ReportType::Feature => 2,
        }
    }
}

/// The global item state at a main item, with the logical and physical
/// extents resolved.
///
/// A logical or physical maximum is sign-extended unless the minimum
/// is non-negative and the sign-extended maximum would be below it. If both
/// physical extents are zero, they equal the logical extents (Section 6.2.2.7).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Globals {
    pub usage_page: UsagePage,
    pub logical_minimum: LogicalMinimum,
    pub logical_maximum: LogicalMaximum,
    pub physical_minimum: PhysicalMinimum,
    pub physical_maximum: PhysicalMaximum,
    pub unit_exponent: UnitExponent,
    pub unit: Unit,
    pub report_size: ReportSize,
    pub report_id: Option<ReportId>,
    pub report_count: ReportCount,
}

/// One Input, Output or Feature main item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportItem {
    pub report_type: ReportType,
    pub globals: Globals,
    /// Offset of this field within its report, in bits, excluding the report ID byte
    pub start_bit: u32,
    /// Index of the enclosing collection, 0 for the root
    pub parent: usize,
    pub data_modes: DataModes,
    pub first_usage_item: usize,
    pub usage_item_count: usize,
    pub first_string_item: usize,
    pub string_item_count: usize,
    pub first_designator_item: usize,
    pub designator_item_count: usize,
}

/// A usage or a usage range from the local items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageItem {
    Usage {
        usage_page: UsagePage,
        usage_id: UsageId,
    },
    Range {
        usage_page: UsagePage,
        minimum: UsageMinimum,
        maximum: UsageMaximum,
    },
}

impl UsageItem {
    pub fn is_range(&self) -> bool {
        matches!(self, UsageItem::Range { .. })
    }

    pub fn usage_page(&self) -> UsagePage {
        match self {
            UsageItem::Usage { usage_page, .. } | UsageItem::Range { usage_page, .. } => {
                *usage_page
            }
        }
    }

    /// The number of usages covered, 0 for a range with minimum > maximum.
    pub fn usage_count(&self) -> usize {
        match self {
            UsageItem::Usage { .. } => 1,
            UsageItem::Range {
                minimum, maximum, ..
            } => {
                let (min, max) = (u16::from(minimum), u16::from(maximum));
                if max >= min {
                    usize::from(max - min) + 1
                } else {
                    0
                }
            }
        }
    }

    /// Usage 0, or a range with both bounds 0
    fn is_zero(&self) -> bool {
        match self {
            UsageItem::Usage { usage_id, .. } => u16::from(usage_id) == 0,
            UsageItem::Range {
                minimum, maximum, ..
            } => u16::from(minimum) == 0 && u16::from(maximum) == 0,
        }
    }
}

/// A string or designator index, or a range thereof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexItem {
    Index(u32),
    Range { minimum: u32, maximum: u32 },
}

/// A collection node. Index 0 of [PreparsedData::collections] is the
/// root that holds all top-level collections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Collection {
    pub collection_type: CollectionType,
    /// The global usage page at the Collection item
    pub usage_page: UsagePage,
    pub first_usage_item: usize,
    pub usage_item_count: usize,
    pub parent: Option<usize>,
    /// Number of direct children
    pub children: usize,
    pub first_child: Option<usize>,
    pub next_sibling: Option<usize>,
    /// Report items within this collection, including nested collections
    pub first_report_item: usize,
    pub report_item_count: usize,
}

/// The length of one report, per report type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSizes {
    pub report_id: Option<ReportId>,
    pub input_bits: u32,
    pub output_bits: u32,
    pub feature_bits: u32,
}

impl ReportSizes {
    pub fn bits(&self, report_type: ReportType) -> u32 {
        match report_type {
            ReportType::Input => self.input_bits,
            ReportType::Output => self.output_bits,
            ReportType::Feature => self.feature_bits,
        }
    }

    /// The report length in bytes including the report ID byte,
    /// or 0 if there is no report of this type.
    pub fn byte_length(&self, report_type: ReportType) -> usize {
        let bits = self.bits(report_type) as usize;
        if bits == 0 {
            0
        } else {
            bits.div_ceil(8) + usize::from(self.report_id.is_some())
        }
    }
}

/// The number of entries in each table of a [PreparsedData].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemCounts {
    pub report_items: usize,
    pub usage_items: usize,
    pub string_items: usize,
    pub designator_items: usize,
    /// Including the root collection
    pub collections: usize,
    pub reports: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Tables {
    pub(crate) report_items: Vec<ReportItem>,
    pub(crate) usage_items: Vec<UsageItem>,
    pub(crate) string_items: Vec<IndexItem>,
    pub(crate) designator_items: Vec<IndexItem>,
    pub(crate) collections: Vec<Collection>,
    pub(crate) reports: Vec<ReportSizes>,
}

fn reserve<T>(table: &mut Vec<T>, count: usize) -> Result<()> {
    table
        .try_reserve_exact(count)
        .map_err(|_| HidError::NotEnoughMemory)
}

impl Tables {
    pub(crate) fn with_capacity(counts: &ItemCounts) -> Result<Tables> {
        let mut tables = Tables::default();
        reserve(&mut tables.report_items, counts.report_items)?;
        reserve(&mut tables.usage_items, counts.usage_items)?;
        reserve(&mut tables.string_items, counts.string_items)?;
        reserve(&mut tables.designator_items, counts.designator_items)?;
        reserve(&mut tables.collections, counts.collections)?;
        reserve(&mut tables.reports, counts.reports)?;
        Ok(tables)
    }

    pub(crate) fn counts(&self) -> ItemCounts {
        ItemCounts {
            report_items: self.report_items.len(),
            usage_items: self.usage_items.len(),
            string_items: self.string_items.len(),
            designator_items: self.designator_items.len(),
            collections: self.collections.len(),
            reports: self.reports.len(),
        }
    }
}

/// The parsed form of a report descriptor, see [open_report_descriptor].
///
/// A default-constructed [PreparsedData] holds no tables, all
/// table accessors return empty slices and [close_report_descriptor]
/// rejects it.
#[derive(Debug, Default)]
pub struct PreparsedData {
    flags: u32,
    tag: u32,
    tables: Option<Box<Tables>>,
}

impl PreparsedData {
    /// The caller-supplied flags, stored as-is
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// `true` if this was returned by a successful [open_report_descriptor]
    pub fn is_valid(&self) -> bool {
        self.tag == PREPARSED_DATA_TAG && self.tables.is_some()
    }

    pub fn report_items(&self) -> &[ReportItem] {
        self.tables
            .as_deref()
            .map(|t| t.report_items.as_slice())
            .unwrap_or_default()
    }

    pub fn usage_items(&self) -> &[UsageItem] {
        self.tables
            .as_deref()
            .map(|t| t.usage_items.as_slice())
            .unwrap_or_default()
    }

    pub fn string_items(&self) -> &[IndexItem] {
        self.tables
            .as_deref()
            .map(|t| t.string_items.as_slice())
            .unwrap_or_default()
    }

    pub fn designator_items(&self) -> &[IndexItem] {
        self.tables
            .as_deref()
            .map(|t| t.designator_items.as_slice())
            .unwrap_or_default()
    }

    pub fn collections(&self) -> &[Collection] {
        self.tables
            .as_deref()
            .map(|t| t.collections.as_slice())
            .unwrap_or_default()
    }

    /// The reports in order of their first appearance in the descriptor
    pub fn reports(&self) -> &[ReportSizes] {
        self.tables
            .as_deref()
            .map(|t| t.reports.as_slice())
            .unwrap_or_default()
    }

    pub fn item_counts(&self) -> ItemCounts {
        self.tables.as_deref().map(Tables::counts).unwrap_or_default()
    }

    /// The usage items of `item`. Indices outside the table give an empty slice.
    pub fn usages_of(&self, item: &ReportItem) -> &[UsageItem] {
        let start = item.first_usage_item;
        let end = start.saturating_add(item.usage_item_count);
        self.usage_items().get(start..end).unwrap_or(&[])
    }

    pub fn strings_of(&self, item: &ReportItem) -> &[IndexItem] {
        let start = item.first_string_item;
        let end = start.saturating_add(item.string_item_count);
        self.string_items().get(start..end).unwrap_or(&[])
    }

    pub fn designators_of(&self, item: &ReportItem) -> &[IndexItem] {
        let start = item.first_designator_item;
        let end = start.saturating_add(item.designator_item_count);
        self.designator_items().get(start..end).unwrap_or(&[])
    }

    /// The report items of the given type, in descriptor order
    pub fn report_items_of_type(
        &self,
        report_type: ReportType,
    ) -> impl Iterator<Item = &ReportItem> {
        self.report_items()
            .iter()
            .filter(move |item| item.report_type == report_type)
    }

    /// The direct children of the collection at `index`
    pub fn children_of(&self, index: usize) -> impl Iterator<Item = &Collection> {
        let collections = self.collections();
        let first = collections.get(index).and_then(|c| c.first_child);
        std::iter::successors(
            first.and_then(|i| collections.get(i)),
            move |c| c.next_sibling.and_then(|i| collections.get(i)),
        )
    }
}

/// Counts the entries each table needs for `descriptor`, without allocating the tables.
pub fn count_descriptor_items(descriptor: &[u8], limits: &ParserLimits) -> Result<ItemCounts> {
    ensure!(!descriptor.is_empty(), HidError::NullPointer);
    parser::count(descriptor, limits)
}

/// Parses `descriptor` with the default [ParserLimits].
pub fn open_report_descriptor(descriptor: &[u8], flags: u32) -> Result<PreparsedData> {
    open_report_descriptor_with(descriptor, flags, &ParserLimits::default())
}

/// Parses `descriptor` into a new [PreparsedData].
///
/// The descriptor is walked twice: once to count the entries of each
/// table, once to fill the tables reserved from those counts. A failed
/// reservation is [HidError::NotEnoughMemory], a malformed descriptor is
/// [HidError::InvalidDescriptor] with the offset of the offending item.
/// Nothing is kept on failure.
pub fn open_report_descriptor_with(
    descriptor: &[u8],
    flags: u32,
    limits: &ParserLimits,
) -> Result<PreparsedData> {
    let counts = count_descriptor_items(descriptor, limits)?;
    let mut tables = Tables::with_capacity(&counts)?;
    let filled = parser::fill(descriptor, limits, &mut tables)?;
    debug_assert_eq!(counts, filled);
    debug_assert_eq!(counts, tables.counts());

    debug!(
        "Opened report descriptor of {} bytes: {} report items in {} reports",
        descriptor.len(),
        counts.report_items,
        counts.reports
    );
    Ok(PreparsedData {
        flags,
        tag: PREPARSED_DATA_TAG,
        tables: Some(Box::new(tables)),
    })
}

/// Releases the tables of `data`. Fails with [HidError::InvalidPreparsedData]
/// if `data` does not come from [open_report_descriptor].
pub fn close_report_descriptor(data: PreparsedData) -> Result<()> {
    ensure!(data.is_valid(), HidError::InvalidPreparsedData);
    debug!(
        "Closing preparsed data with {} report items",
        data.report_items().len()
    );
    Ok(())
}

/// A constant field without usages, or whose first usage is usage 0.
///
/// A `first_usage_item` outside the usage table is not padding.
pub fn is_padding(item: &ReportItem, data: &PreparsedData) -> bool {
    if !item.data_modes.is_constant() {
        return false;
    }
    if item.usage_item_count == 0 {
        return true;
    }
    data.usage_items()
        .get(item.first_usage_item)
        .is_some_and(UsageItem::is_zero)
}

/// An array field or a field of 1-bit values, padding excluded.
pub fn is_button(item: &ReportItem, data: &PreparsedData) -> bool {
    !is_padding(item, data)
        && (item.data_modes.is_array() || u32::from(item.globals.report_size) == 1)
}

/// A variable field of multi-bit values, padding excluded.
pub fn is_variable(item: &ReportItem, data: &PreparsedData) -> bool {
    !is_padding(item, data)
        && !item.data_modes.is_array()
        && u32::from(item.globals.report_size) != 1
}

/// The number of usages of `item`, each range counting all of its usages.
pub fn usage_count(item: &ReportItem, data: &PreparsedData) -> usize {
    data.usages_of(item)
        .iter()
        .map(UsageItem::usage_count)
        .sum()
}

/// Summary of a [PreparsedData]. Button and value caps are counted per
/// report item, see [is_button] and [is_variable].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Caps {
    /// Usage page of the first top-level collection
    pub usage_page: UsagePage,
    /// Usage of the first top-level collection
    pub usage: UsageId,
    /// Longest report of each type in bytes, including the report ID byte
    pub input_report_byte_length: usize,
    pub output_report_byte_length: usize,
    pub feature_report_byte_length: usize,
    /// Number of collections in the descriptor, the root is not counted
    pub number_collection_nodes: usize,
    pub number_input_button_caps: usize,
    pub number_input_value_caps: usize,
    pub number_output_button_caps: usize,
    pub number_output_value_caps: usize,
    pub number_feature_button_caps: usize,
    pub number_feature_value_caps: usize,
}

pub fn get_caps(data: &PreparsedData) -> Result<Caps> {
    ensure!(data.is_valid(), HidError::InvalidPreparsedData);

    let mut caps = Caps {
        number_collection_nodes: data.collections().len().saturating_sub(1),
        ..Default::default()
    };

    let top_level = data.children_of(0).next();
    let usage = top_level.and_then(|c| {
        data.usage_items()
            .get(c.first_usage_item)
            .filter(|_| c.usage_item_count > 0)
    });
    match usage {
        Some(UsageItem::Usage {
            usage_page,
            usage_id,
        }) => {
            caps.usage_page = *usage_page;
            caps.usage = *usage_id;
        }
        Some(UsageItem::Range {
            usage_page,
            minimum,
            ..
        }) => {
            caps.usage_page = *usage_page;
            caps.usage = UsageId(u16::from(minimum));
        }
        None => {}
    }

    let longest = |report_type| {
        data.reports()
            .iter()
            .map(|r| r.byte_length(report_type))
            .max()
            .unwrap_or(0)
    };
    caps.input_report_byte_length = longest(ReportType::Input);
    caps.output_report_byte_length = longest(ReportType::Output);
    caps.feature_report_byte_length = longest(ReportType::Feature);

    for item in data.report_items() {
        let (buttons, values) = match item.report_type {
            ReportType::Input => (
                &mut caps.number_input_button_caps,
                &mut caps.number_input_value_caps,
            ),
            ReportType::Output => (
                &mut caps.number_output_button_caps,
                &mut caps.number_output_value_caps,
            ),
            ReportType::Feature => (
                &mut caps.number_feature_button_caps,
                &mut caps.number_feature_value_caps,
            ),
        };
        if is_button(item, data) {
            *buttons += 1;
        } else if is_variable(item, data) {
            *values += 1;
        }
    }

    Ok(caps)
}
