// SPDX-License-Identifier: MIT

//! The two passes over a report descriptor.
//!
//! Both passes run the same state machine ([walk]) over the items of the
//! descriptor: the item state table of Section 6.2.2.7 (global items, with
//! Push/Pop), the local items of Section 6.2.2.8 and the collection nesting.
//! What happens with the decoded entries is up to the [TableSink]:
//!
//! - the counting pass uses [Tally], which stores nothing. The resulting
//!   [ItemCounts] size the tables.
//! - the parsing pass uses [TableFiller], which pushes every entry into the
//!   tables reserved from those counts.
//!
//! Since the decisions are all made by the walker, both passes see the same
//! number of entries.

use log::{debug, trace, warn};

use crate::hid::{GlobalItem, HidValue, ItemType, LocalItem, MainItem, ReportDescriptorItems};
use crate::types::*;
use crate::{
    ensure, Collection, Globals, HidError, IndexItem, ItemCounts, ParserLimits, ReportItem,
    ReportSizes, ReportType, Result, Tables, UsageItem,
};

fn invalid(offset: usize, message: impl Into<String>) -> HidError {
    HidError::InvalidDescriptor {
        offset,
        message: message.into(),
    }
}

/// Receives the decoded table entries in the order they are produced.
/// Entry indices are assigned by the walker.
pub(crate) trait TableSink {
    fn usage_item(&mut self, _item: UsageItem) {}
    fn string_item(&mut self, _item: IndexItem) {}
    fn designator_item(&mut self, _item: IndexItem) {}
    fn report_item(&mut self, _item: ReportItem) {}
    /// `previous_sibling` is the collection opened last within the same parent.
    fn open_collection(
        &mut self,
        _index: usize,
        _collection: Collection,
        _previous_sibling: Option<usize>,
    ) {
    }
    /// `report_item_end` is one past the last report item declared
    /// inside this collection.
    fn close_collection(&mut self, _index: usize, _report_item_end: usize) {}
}

/// The counting pass
pub(crate) struct Tally;

impl TableSink for Tally {}

/// The parsing pass. The tables must have been reserved from the
/// counting pass so none of the pushes reallocate.
pub(crate) struct TableFiller<'t> {
    tables: &'t mut Tables,
}

impl TableSink for TableFiller<'_> {
    fn usage_item(&mut self, item: UsageItem) {
        self.tables.usage_items.push(item);
    }

    fn string_item(&mut self, item: IndexItem) {
        self.tables.string_items.push(item);
    }

    fn designator_item(&mut self, item: IndexItem) {
        self.tables.designator_items.push(item);
    }

    fn report_item(&mut self, item: ReportItem) {
        self.tables.report_items.push(item);
    }

    fn open_collection(
        &mut self,
        index: usize,
        collection: Collection,
        previous_sibling: Option<usize>,
    ) {
        let parent = collection.parent;
        self.tables.collections.push(collection);
        let collections = &mut self.tables.collections;
        if let Some(previous) = previous_sibling.and_then(|p| collections.get_mut(p)) {
            previous.next_sibling = Some(index);
        }
        if let Some(parent) = parent.and_then(|p| collections.get_mut(p)) {
            if parent.first_child.is_none() {
                parent.first_child = Some(index);
            }
            parent.children += 1;
        }
    }

    fn close_collection(&mut self, index: usize, report_item_end: usize) {
        if let Some(collection) = self.tables.collections.get_mut(index) {
            collection.report_item_count = report_item_end - collection.first_report_item;
        }
    }
}

/// Item state table for the global items, Section 6.2.2.7.
/// Zero-initialized, a field keeps its value until overridden.
#[derive(Clone, Copy, Debug, Default)]
struct GlobalState {
    usage_page: UsagePage,
    logical_minimum: HidValue,
    logical_maximum: HidValue,
    physical_minimum: HidValue,
    physical_maximum: HidValue,
    unit_exponent: UnitExponent,
    unit: Unit,
    report_size: ReportSize,
    report_id: Option<ReportId>,
    report_count: ReportCount,
}

/// The maximum is sign-extended unless that would put it below a
/// non-negative minimum, e.g. `Logical Minimum (0)`, `Logical Maximum (255)`
/// encoded in a single byte.
fn resolve_maximum(minimum: i32, maximum: &HidValue) -> i32 {
    let signed = i32::from(maximum);
    if minimum >= 0 && signed < minimum {
        u32::from(maximum) as i32
    } else {
        signed
    }
}

impl GlobalState {
    fn resolve(&self) -> Globals {
        let logical_minimum = i32::from(&self.logical_minimum);
        let logical_maximum = resolve_maximum(logical_minimum, &self.logical_maximum);

        // Section 6.2.2.7: if both are zero, the physical extents equal the logical extents
        let (physical_minimum, physical_maximum) =
            if u32::from(&self.physical_minimum) == 0 && u32::from(&self.physical_maximum) == 0 {
                (logical_minimum, logical_maximum)
            } else {
                let minimum = i32::from(&self.physical_minimum);
                (minimum, resolve_maximum(minimum, &self.physical_maximum))
            };

        Globals {
            usage_page: self.usage_page,
            logical_minimum: LogicalMinimum(logical_minimum),
            logical_maximum: LogicalMaximum(logical_maximum),
            physical_minimum: PhysicalMinimum(physical_minimum),
            physical_maximum: PhysicalMaximum(physical_maximum),
            unit_exponent: self.unit_exponent,
            unit: self.unit,
            report_size: self.report_size,
            report_id: self.report_id,
            report_count: self.report_count,
        }
    }
}

/// A usage as collected from the local items. Usages without
/// their own usage page take the global one at the main item.
#[derive(Clone, Copy, Debug)]
enum LocalUsage {
    Usage {
        usage_page: Option<UsagePage>,
        usage_id: UsageId,
    },
    Range {
        usage_page: Option<UsagePage>,
        minimum: UsageMinimum,
        maximum: UsageMaximum,
    },
}

impl LocalUsage {
    fn resolve(&self, global_page: UsagePage) -> UsageItem {
        match *self {
            LocalUsage::Usage {
                usage_page,
                usage_id,
            } => UsageItem::Usage {
                usage_page: usage_page.unwrap_or(global_page),
                usage_id,
            },
            LocalUsage::Range {
                usage_page,
                minimum,
                maximum,
            } => UsageItem::Range {
                usage_page: usage_page.unwrap_or(global_page),
                minimum,
                maximum,
            },
        }
    }
}

/// Item state table for the local items, Section 6.2.2.8.
/// Cleared after every main item.
#[derive(Debug, Default)]
struct Locals {
    usages: Vec<LocalUsage>,
    usage_minimum: Option<(Option<UsagePage>, UsageMinimum)>,
    usage_maximum: Option<(Option<UsagePage>, UsageMaximum)>,
    strings: Vec<IndexItem>,
    string_minimum: Option<u32>,
    string_maximum: Option<u32>,
    designators: Vec<IndexItem>,
    designator_minimum: Option<u32>,
    designator_maximum: Option<u32>,
    /// `Some(true)` once the open delimiter set has its usage
    delimiter: Option<bool>,
}

impl Locals {
    fn clear(&mut self) {
        // keeps the capacity of the vectors
        self.usages.clear();
        self.usage_minimum = None;
        self.usage_maximum = None;
        self.strings.clear();
        self.string_minimum = None;
        self.string_maximum = None;
        self.designators.clear();
        self.designator_minimum = None;
        self.designator_maximum = None;
        self.delimiter = None;
    }

    /// Inside a delimiter set only the first usage is used, Section 6.2.2.8
    fn accepts_usage(&self) -> bool {
        self.delimiter != Some(true)
    }

    fn add_usage(&mut self, offset: usize, usage: LocalUsage) {
        if !self.accepts_usage() {
            warn!("Ignoring alternative usage at offset {offset:#x}");
            return;
        }
        self.usages.push(usage);
        if self.delimiter.is_some() {
            self.delimiter = Some(true);
        }
    }

    fn complete_usage_range(&mut self, offset: usize) {
        if let (Some((page_min, minimum)), Some((page_max, maximum))) =
            (self.usage_minimum, self.usage_maximum)
        {
            self.usage_minimum = None;
            self.usage_maximum = None;
            self.add_usage(
                offset,
                LocalUsage::Range {
                    usage_page: page_min.or(page_max),
                    minimum,
                    maximum,
                },
            );
        }
    }

    fn complete_string_range(&mut self) {
        if let (Some(minimum), Some(maximum)) = (self.string_minimum, self.string_maximum) {
            self.string_minimum = None;
            self.string_maximum = None;
            self.strings.push(IndexItem::Range { minimum, maximum });
        }
    }

    fn complete_designator_range(&mut self) {
        if let (Some(minimum), Some(maximum)) = (self.designator_minimum, self.designator_maximum)
        {
            self.designator_minimum = None;
            self.designator_maximum = None;
            self.designators.push(IndexItem::Range { minimum, maximum });
        }
    }

    /// Discards a pending half that was not paired before the set closed.
    fn close_delimiter(&mut self, offset: usize) {
        let (minimum, maximum) = (self.usage_minimum.take(), self.usage_maximum.take());
        if minimum.is_some() || maximum.is_some() {
            warn!("Discarding unmatched Usage Minimum/Maximum in delimiter set closed at offset {offset:#x}");
        }
        self.delimiter = None;
    }

    fn warn_unmatched(&self, offset: usize) {
        if self.usage_minimum.is_some() || self.usage_maximum.is_some() {
            warn!("Discarding unmatched Usage Minimum/Maximum before main item at offset {offset:#x}");
        }
        if self.string_minimum.is_some() || self.string_maximum.is_some() {
            warn!("Discarding unmatched String Minimum/Maximum before main item at offset {offset:#x}");
        }
        if self.designator_minimum.is_some() || self.designator_maximum.is_some() {
            warn!("Discarding unmatched Designator Minimum/Maximum before main item at offset {offset:#x}");
        }
    }
}

/// Per report ID and report type running bit counts. The report ID
/// is a u8 so this is a fixed size table, slot 0 is the report without ID.
pub(crate) struct ReportTable {
    bits: [[u32; 3]; 256],
    seen: [bool; 256],
    order: [u8; 256],
    len: usize,
}

impl ReportTable {
    fn new() -> Self {
        ReportTable {
            bits: [[0; 3]; 256],
            seen: [false; 256],
            order: [0; 256],
            len: 0,
        }
    }

    /// Appends `nbits` to the report and returns the start bit of the field,
    /// or `None` if the report would exceed `u32::MAX` bits.
    fn append(
        &mut self,
        report_id: Option<ReportId>,
        report_type: ReportType,
        nbits: u32,
    ) -> Option<u32> {
        let slot = report_id.map(u8::from).unwrap_or(0) as usize;
        if !self.seen[slot] {
            self.seen[slot] = true;
            self.order[self.len] = slot as u8;
            self.len += 1;
        }
        let bits = &mut self.bits[slot][report_type.index()];
        let start = *bits;
        *bits = start.checked_add(nbits)?;
        Some(start)
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// The reports in order of first appearance.
    pub(crate) fn sizes(&self) -> impl Iterator<Item = ReportSizes> + '_ {
        self.order[..self.len].iter().map(move |&slot| {
            let bits = &self.bits[slot as usize];
            ReportSizes {
                report_id: (slot != 0).then_some(ReportId(slot)),
                input_bits: bits[ReportType::Input.index()],
                output_bits: bits[ReportType::Output.index()],
                feature_bits: bits[ReportType::Feature.index()],
            }
        })
    }
}

/// Stores one half of a min/max pair, a half that is already pending is discarded.
fn replace_half<T>(slot: &mut Option<T>, value: T, what: &str, offset: usize) {
    if slot.replace(value).is_some() {
        warn!("Discarding unmatched {what} replaced at offset {offset:#x}");
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenCollection {
    index: usize,
    last_child: Option<usize>,
}

struct Walker<'a, S: TableSink> {
    limits: &'a ParserLimits,
    sink: &'a mut S,
    globals: GlobalState,
    global_stack: Vec<GlobalState>,
    locals: Locals,
    collections: Vec<OpenCollection>,
    counts: ItemCounts,
    reports: ReportTable,
}

impl<'a, S: TableSink> Walker<'a, S> {
    fn new(limits: &'a ParserLimits, sink: &'a mut S) -> Self {
        let mut walker = Walker {
            limits,
            sink,
            globals: GlobalState::default(),
            global_stack: Vec::new(),
            locals: Locals::default(),
            collections: Vec::new(),
            counts: ItemCounts::default(),
            reports: ReportTable::new(),
        };

        // The virtual root collection, everything else is nested within
        let root = Collection::default();
        walker.sink.open_collection(0, root, None);
        walker.counts.collections = 1;
        walker.collections.push(OpenCollection {
            index: 0,
            last_child: None,
        });
        walker
    }

    fn global_item(&mut self, offset: usize, item: GlobalItem) -> Result<()> {
        let globals = &mut self.globals;
        match item {
            GlobalItem::UsagePage(usage_page) => globals.usage_page = usage_page,
            GlobalItem::LogicalMinimum(minimum) => globals.logical_minimum = minimum,
            GlobalItem::LogicalMaximum(maximum) => globals.logical_maximum = maximum,
            GlobalItem::PhysicalMinimum(minimum) => globals.physical_minimum = minimum,
            GlobalItem::PhysicalMaximum(maximum) => globals.physical_maximum = maximum,
            GlobalItem::UnitExponent(exponent) => globals.unit_exponent = exponent,
            GlobalItem::Unit(unit) => globals.unit = unit,
            GlobalItem::ReportSize(size) => globals.report_size = size,
            GlobalItem::ReportId(id) => {
                ensure!(u8::from(id) != 0, invalid(offset, "Report ID 0 is reserved"));
                globals.report_id = Some(id);
            }
            GlobalItem::ReportCount(count) => globals.report_count = count,
            GlobalItem::Push => {
                ensure!(
                    self.global_stack.len() < self.limits.max_global_stack_depth,
                    invalid(
                        offset,
                        format!(
                            "Push exceeds the maximum depth of {}",
                            self.limits.max_global_stack_depth
                        )
                    )
                );
                self.global_stack.push(*globals);
            }
            GlobalItem::Pop => {
                *globals = self
                    .global_stack
                    .pop()
                    .ok_or_else(|| invalid(offset, "Pop without Push"))?;
            }
            GlobalItem::Reserved { value } => {
                warn!("Skipping reserved global item {value:#04x} at offset {offset:#x}");
            }
        }
        Ok(())
    }

    fn local_item(&mut self, offset: usize, item: LocalItem) -> Result<()> {
        let locals = &mut self.locals;
        match item {
            LocalItem::Usage(usage_page, usage_id) => locals.add_usage(
                offset,
                LocalUsage::Usage {
                    usage_page: Some(usage_page),
                    usage_id,
                },
            ),
            LocalItem::UsageId(usage_id) => locals.add_usage(
                offset,
                LocalUsage::Usage {
                    usage_page: None,
                    usage_id,
                },
            ),
            LocalItem::UsageMinimum(minimum) | LocalItem::ExtendedUsageMinimum(_, minimum) => {
                if !locals.accepts_usage() {
                    warn!("Ignoring alternative Usage Minimum at offset {offset:#x}");
                } else {
                    let page = match item {
                        LocalItem::ExtendedUsageMinimum(page, _) => Some(page),
                        _ => None,
                    };
                    replace_half(&mut locals.usage_minimum, (page, minimum), "Usage Minimum", offset);
                    locals.complete_usage_range(offset);
                }
            }
            LocalItem::UsageMaximum(maximum) | LocalItem::ExtendedUsageMaximum(_, maximum) => {
                if !locals.accepts_usage() {
                    warn!("Ignoring alternative Usage Maximum at offset {offset:#x}");
                } else {
                    let page = match item {
                        LocalItem::ExtendedUsageMaximum(page, _) => Some(page),
                        _ => None,
                    };
                    replace_half(&mut locals.usage_maximum, (page, maximum), "Usage Maximum", offset);
                    locals.complete_usage_range(offset);
                }
            }
            LocalItem::StringIndex(index) => locals.strings.push(IndexItem::Index(index.into())),
            LocalItem::StringMinimum(minimum) => {
                replace_half(&mut locals.string_minimum, minimum.into(), "String Minimum", offset);
                locals.complete_string_range();
            }
            LocalItem::StringMaximum(maximum) => {
                replace_half(&mut locals.string_maximum, maximum.into(), "String Maximum", offset);
                locals.complete_string_range();
            }
            LocalItem::DesignatorIndex(index) => {
                locals.designators.push(IndexItem::Index(index.into()))
            }
            LocalItem::DesignatorMinimum(minimum) => {
                replace_half(
                    &mut locals.designator_minimum,
                    minimum.into(),
                    "Designator Minimum",
                    offset,
                );
                locals.complete_designator_range();
            }
            LocalItem::DesignatorMaximum(maximum) => {
                replace_half(
                    &mut locals.designator_maximum,
                    maximum.into(),
                    "Designator Maximum",
                    offset,
                );
                locals.complete_designator_range();
            }
            LocalItem::Delimiter(delimiter) if delimiter.is_open() => {
                ensure!(
                    locals.delimiter.is_none(),
                    invalid(offset, "Nested delimiter set")
                );
                locals.delimiter = Some(false);
            }
            LocalItem::Delimiter(delimiter) => {
                ensure!(
                    u32::from(delimiter) == 0,
                    invalid(offset, format!("Invalid delimiter value {delimiter}"))
                );
                ensure!(
                    locals.delimiter.is_some(),
                    invalid(offset, "Delimiter close without open")
                );
                locals.close_delimiter(offset);
            }
            LocalItem::Reserved { value } => {
                warn!("Skipping reserved local item {value:#04x} at offset {offset:#x}");
            }
        }
        Ok(())
    }

    /// Hands the staged usages to the sink, returns the index of the first and the count.
    fn emit_usages(&mut self) -> (usize, usize) {
        let first = self.counts.usage_items;
        for usage in self.locals.usages.iter() {
            self.sink.usage_item(usage.resolve(self.globals.usage_page));
        }
        self.counts.usage_items += self.locals.usages.len();
        (first, self.locals.usages.len())
    }

    fn emit_strings(&mut self) -> (usize, usize) {
        let first = self.counts.string_items;
        for string in self.locals.strings.iter() {
            self.sink.string_item(*string);
        }
        self.counts.string_items += self.locals.strings.len();
        (first, self.locals.strings.len())
    }

    fn emit_designators(&mut self) -> (usize, usize) {
        let first = self.counts.designator_items;
        for designator in self.locals.designators.iter() {
            self.sink.designator_item(*designator);
        }
        self.counts.designator_items += self.locals.designators.len();
        (first, self.locals.designators.len())
    }

    fn current_collection(&self) -> usize {
        self.collections.last().map(|c| c.index).unwrap_or(0)
    }

    fn main_item(&mut self, offset: usize, item: MainItem) -> Result<()> {
        ensure!(
            self.locals.delimiter.is_none(),
            invalid(offset, "Main item inside an open delimiter set")
        );
        self.locals.warn_unmatched(offset);
        match item {
            MainItem::Input(modes) => self.data_item(offset, ReportType::Input, modes)?,
            MainItem::Output(modes) => self.data_item(offset, ReportType::Output, modes)?,
            MainItem::Feature(modes) => self.data_item(offset, ReportType::Feature, modes)?,
            MainItem::Collection(collection_type) => {
                self.open_collection(offset, collection_type)?
            }
            MainItem::EndCollection => self.close_collection(offset)?,
        }
        self.locals.clear();
        Ok(())
    }

    fn data_item(&mut self, offset: usize, report_type: ReportType, modes: DataModes) -> Result<()> {
        let globals = self.globals.resolve();
        let nbits = u32::from(globals.report_size)
            .checked_mul(u32::from(globals.report_count))
            .ok_or_else(|| invalid(offset, "Report Size times Report Count overflows"))?;
        let start_bit = self
            .reports
            .append(globals.report_id, report_type, nbits)
            .ok_or_else(|| invalid(offset, "Report length overflows"))?;

        let (first_usage_item, usage_item_count) = self.emit_usages();
        let (first_string_item, string_item_count) = self.emit_strings();
        let (first_designator_item, designator_item_count) = self.emit_designators();

        let item = ReportItem {
            report_type,
            globals,
            start_bit,
            parent: self.current_collection(),
            data_modes: modes,
            first_usage_item,
            usage_item_count,
            first_string_item,
            string_item_count,
            first_designator_item,
            designator_item_count,
        };
        trace!(
            "{report_type:?} ({modes}) at offset {offset:#x}: {nbits} bits starting at bit {start_bit}"
        );
        self.sink.report_item(item);
        self.counts.report_items += 1;
        Ok(())
    }

    fn open_collection(&mut self, offset: usize, collection_type: CollectionType) -> Result<()> {
        // the root collection does not count towards the depth
        ensure!(
            self.collections.len() <= self.limits.max_collection_depth,
            invalid(
                offset,
                format!(
                    "Collection nesting exceeds the maximum depth of {}",
                    self.limits.max_collection_depth
                )
            )
        );
        let (first_usage_item, usage_item_count) = self.emit_usages();
        let index = self.counts.collections;
        let first_report_item = self.counts.report_items;
        let usage_page = self.globals.usage_page;

        let parent = self
            .collections
            .last_mut()
            .ok_or_else(|| invalid(offset, "Collection outside of the root collection"))?;
        let previous_sibling = parent.last_child.replace(index);
        let collection = Collection {
            collection_type,
            usage_page,
            first_usage_item,
            usage_item_count,
            parent: Some(parent.index),
            children: 0,
            first_child: None,
            next_sibling: None,
            first_report_item,
            report_item_count: 0,
        };
        trace!("Collection {collection_type:?} #{index} at offset {offset:#x}");

        self.sink.open_collection(index, collection, previous_sibling);
        self.counts.collections += 1;
        self.collections.push(OpenCollection {
            index,
            last_child: None,
        });
        Ok(())
    }

    fn close_collection(&mut self, offset: usize) -> Result<()> {
        ensure!(
            self.collections.len() > 1,
            invalid(offset, "End Collection without Collection")
        );
        if let Some(collection) = self.collections.pop() {
            self.sink
                .close_collection(collection.index, self.counts.report_items);
        }
        Ok(())
    }

    fn finish(mut self, end: usize) -> Result<(ItemCounts, ReportTable)> {
        ensure!(
            self.locals.delimiter.is_none(),
            invalid(end, "Delimiter set not closed")
        );
        ensure!(
            self.collections.len() == 1,
            invalid(
                end,
                format!("{} collection(s) not closed", self.collections.len() - 1)
            )
        );
        if !self.global_stack.is_empty() {
            debug!("{} Push item(s) without Pop", self.global_stack.len());
        }
        self.sink.close_collection(0, self.counts.report_items);
        self.counts.reports = self.reports.len();
        Ok((self.counts, self.reports))
    }
}

/// Runs the state machine over all items of `bytes`, handing each
/// decoded entry to `sink`.
fn walk<S: TableSink>(
    bytes: &[u8],
    limits: &ParserLimits,
    sink: &mut S,
) -> Result<(ItemCounts, ReportTable)> {
    let mut walker = Walker::new(limits, sink);
    for rdesc_item in ReportDescriptorItems::new(bytes) {
        let rdesc_item = rdesc_item?;
        let offset = rdesc_item.offset();
        match rdesc_item.item_type() {
            ItemType::Main(item) => walker.main_item(offset, item)?,
            ItemType::Global(item) => walker.global_item(offset, item)?,
            ItemType::Local(item) => walker.local_item(offset, item)?,
            ItemType::Long => {
                debug!(
                    "Skipping long item with tag {:#04x} at offset {offset:#x}",
                    rdesc_item.tag()
                );
            }
        }
    }
    walker.finish(bytes.len())
}

/// The counting pass.
pub(crate) fn count(bytes: &[u8], limits: &ParserLimits) -> Result<ItemCounts> {
    let (counts, _) = walk(bytes, limits, &mut Tally)?;
    debug!("Counting pass: {counts:?}");
    Ok(counts)
}

/// The parsing pass, fills `tables` which must be reserved for the
/// counts returned by [count].
pub(crate) fn fill(bytes: &[u8], limits: &ParserLimits, tables: &mut Tables) -> Result<ItemCounts> {
    let mut filler = TableFiller {
        tables: &mut *tables,
    };
    let (counts, reports) = walk(bytes, limits, &mut filler)?;
    tables.reports.extend(reports.sizes());
    debug!("Parsing pass: {counts:?}");
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    const MOUSE: [u8; 50] = [
        0x05, 0x01,                    // Usage Page (Generic Desktop)
        0x09, 0x02,                    // Usage (Mouse)
        0xa1, 0x01,                    // Collection (Application)
        0x09, 0x01,                    //   Usage (Pointer)
        0xa1, 0x00,                    //   Collection (Physical)
        0x05, 0x09,                    //     Usage Page (Button)
        0x19, 0x01,                    //     Usage Minimum (1)
        0x29, 0x03,                    //     Usage Maximum (3)
        0x15, 0x00,                    //     Logical Minimum (0)
        0x25, 0x01,                    //     Logical Maximum (1)
        0x95, 0x03,                    //     Report Count (3)
        0x75, 0x01,                    //     Report Size (1)
        0x81, 0x02,                    //     Input (Data,Var,Abs)
        0x95, 0x01,                    //     Report Count (1)
        0x75, 0x05,                    //     Report Size (5)
        0x81, 0x01,                    //     Input (Cnst,Arr,Abs)
        0x05, 0x01,                    //     Usage Page (Generic Desktop)
        0x09, 0x30,                    //     Usage (X)
        0x09, 0x31,                    //     Usage (Y)
        0x15, 0x81,                    //     Logical Minimum (-127)
        0x25, 0x7f,                    //     Logical Maximum (127)
        0x75, 0x08,                    //     Report Size (8)
        0x95, 0x02,                    //     Report Count (2)
        0x81, 0x06,                    //     Input (Data,Var,Rel)
        0xc0,                          //   End Collection
        0xc0,                          // End Collection
    ];

    fn parse(bytes: &[u8]) -> Result<Tables> {
        let limits = ParserLimits::default();
        let counts = count(bytes, &limits)?;
        let mut tables = Tables::with_capacity(&counts)?;
        let filled = fill(bytes, &limits, &mut tables)?;
        assert_eq!(counts, filled);
        assert_eq!(counts, tables.counts());
        Ok(tables)
    }

    #[test]
    fn mouse() {
        let tables = parse(&MOUSE).unwrap();
        assert_eq!(tables.report_items.len(), 3);
        // Mouse, Pointer, Button range, X, Y
        assert_eq!(tables.usage_items.len(), 5);
        // root, application, physical
        assert_eq!(tables.collections.len(), 3);
        assert_eq!(tables.reports.len(), 1);
        assert_eq!(tables.reports[0].report_id, None);
        assert_eq!(tables.reports[0].input_bits, 24);

        let buttons = &tables.report_items[0];
        assert_eq!(buttons.start_bit, 0);
        assert_eq!(buttons.parent, 2);
        assert_eq!(buttons.first_usage_item, 2);
        assert_eq!(buttons.usage_item_count, 1);
        assert_eq!(
            tables.usage_items[2],
            UsageItem::Range {
                usage_page: UsagePage(0x09),
                minimum: UsageMinimum(1),
                maximum: UsageMaximum(3),
            }
        );

        let padding = &tables.report_items[1];
        assert_eq!(padding.start_bit, 3);
        assert_eq!(padding.usage_item_count, 0);

        let axes = &tables.report_items[2];
        assert_eq!(axes.start_bit, 8);
        assert_eq!(axes.usage_item_count, 2);
        assert_eq!(axes.globals.logical_minimum, LogicalMinimum(-127));
        assert_eq!(axes.globals.logical_maximum, LogicalMaximum(127));
        assert_eq!(axes.globals.physical_minimum, PhysicalMinimum(-127));
        assert_eq!(axes.globals.physical_maximum, PhysicalMaximum(127));
        assert!(axes.data_modes.is_relative());
    }

    #[test]
    fn collection_tree() {
        let tables = parse(&MOUSE).unwrap();
        let root = &tables.collections[0];
        assert_eq!(root.parent, None);
        assert_eq!(root.first_child, Some(1));
        assert_eq!(root.children, 1);
        assert_eq!(root.report_item_count, 3);

        let application = &tables.collections[1];
        assert_eq!(application.collection_type, CollectionType::Application);
        assert_eq!(application.parent, Some(0));
        assert_eq!(application.first_child, Some(2));
        assert_eq!(application.usage_item_count, 1);
        assert_eq!(
            tables.usage_items[application.first_usage_item],
            UsageItem::Usage {
                usage_page: UsagePage(0x01),
                usage_id: UsageId(0x02),
            }
        );

        let physical = &tables.collections[2];
        assert_eq!(physical.collection_type, CollectionType::Physical);
        assert_eq!(physical.parent, Some(1));
        assert_eq!(physical.first_child, None);
        assert_eq!(physical.next_sibling, None);
        assert_eq!(physical.first_report_item, 0);
        assert_eq!(physical.report_item_count, 3);
    }

    #[test]
    fn siblings() {
        #[rustfmt::skip]
        let bytes = [
            0xa1, 0x01,                    // Collection (Application)
            0xa1, 0x02,                    //   Collection (Logical)
            0xc0,                          //   End Collection
            0xa1, 0x02,                    //   Collection (Logical)
            0xc0,                          //   End Collection
            0xa1, 0x02,                    //   Collection (Logical)
            0xc0,                          //   End Collection
            0xc0,                          // End Collection
        ];
        let tables = parse(&bytes).unwrap();
        assert_eq!(tables.collections.len(), 5);
        assert_eq!(tables.collections[1].children, 3);
        assert_eq!(tables.collections[1].first_child, Some(2));
        assert_eq!(tables.collections[2].next_sibling, Some(3));
        assert_eq!(tables.collections[3].next_sibling, Some(4));
        assert_eq!(tables.collections[4].next_sibling, None);
    }

    #[test]
    fn push_pop() {
        #[rustfmt::skip]
        let bytes = [
            0x75, 0x08,                    // Report Size (8)
            0x95, 0x01,                    // Report Count (1)
            0xa4,                          // Push
            0x75, 0x10,                    //   Report Size (16)
            0x81, 0x02,                    //   Input (Data,Var,Abs)
            0xb4,                          // Pop
            0x81, 0x02,                    // Input (Data,Var,Abs)
        ];
        let tables = parse(&bytes).unwrap();
        assert_eq!(tables.report_items[0].globals.report_size, ReportSize(16));
        assert_eq!(tables.report_items[1].globals.report_size, ReportSize(8));
        assert_eq!(tables.report_items[1].start_bit, 16);
        assert_eq!(tables.reports[0].input_bits, 24);
    }

    #[test]
    fn pop_without_push() {
        let bytes = [0x75, 0x08, 0xb4];
        match parse(&bytes) {
            Err(HidError::InvalidDescriptor { offset, .. }) => assert_eq!(offset, 2),
            r => panic!("Unexpected result {r:?}"),
        }
    }

    #[test]
    fn push_depth() {
        let limits = ParserLimits {
            max_global_stack_depth: 2,
            ..Default::default()
        };
        assert!(count(&[0xa4, 0xa4], &limits).is_ok());
        assert!(count(&[0xa4, 0xa4, 0xa4], &limits).is_err());
    }

    #[test]
    fn collection_depth() {
        let limits = ParserLimits {
            max_collection_depth: 2,
            ..Default::default()
        };
        let bytes = [0xa1, 0x01, 0xa1, 0x00, 0xc0, 0xc0];
        assert!(count(&bytes, &limits).is_ok());
        let bytes = [0xa1, 0x01, 0xa1, 0x00, 0xa1, 0x00, 0xc0, 0xc0, 0xc0];
        match count(&bytes, &limits) {
            Err(HidError::InvalidDescriptor { offset, .. }) => assert_eq!(offset, 4),
            r => panic!("Unexpected result {r:?}"),
        }
    }

    #[test]
    fn unbalanced_collections() {
        assert!(parse(&[0xc0]).is_err());
        assert!(parse(&[0xa1, 0x01]).is_err());
        assert!(parse(&[0xa1, 0x01, 0xc0, 0xc0]).is_err());
    }

    #[test]
    fn report_ids() {
        #[rustfmt::skip]
        let bytes = [
            0x85, 0x01,                    // Report ID (1)
            0x75, 0x08,                    // Report Size (8)
            0x95, 0x02,                    // Report Count (2)
            0x81, 0x02,                    // Input (Data,Var,Abs)
            0x85, 0x02,                    // Report ID (2)
            0x91, 0x02,                    // Output (Data,Var,Abs)
            0x85, 0x01,                    // Report ID (1)
            0x95, 0x01,                    // Report Count (1)
            0x81, 0x02,                    // Input (Data,Var,Abs)
            0xb1, 0x02,                    // Feature (Data,Var,Abs)
        ];
        let tables = parse(&bytes).unwrap();
        assert_eq!(tables.reports.len(), 2);
        assert_eq!(
            tables.reports[0],
            ReportSizes {
                report_id: Some(ReportId(1)),
                input_bits: 24,
                output_bits: 0,
                feature_bits: 8,
            }
        );
        assert_eq!(tables.reports[1].report_id, Some(ReportId(2)));
        assert_eq!(tables.reports[1].output_bits, 16);
        assert_eq!(tables.report_items[2].start_bit, 16);
        assert_eq!(tables.report_items[3].start_bit, 0);
    }

    #[test]
    fn report_id_zero() {
        assert!(parse(&[0x85, 0x00]).is_err());
    }

    #[test]
    fn report_length_overflow() {
        #[rustfmt::skip]
        let bytes = [
            0x77, 0xff, 0xff, 0xff, 0xff,  // Report Size (0xffffffff)
            0x95, 0x02,                    // Report Count (2)
            0x81, 0x02,                    // Input (Data,Var,Abs)
        ];
        assert!(parse(&bytes).is_err());
    }

    #[test]
    fn unsigned_logical_maximum() {
        #[rustfmt::skip]
        let bytes = [
            0x15, 0x00,                    // Logical Minimum (0)
            0x25, 0xff,                    // Logical Maximum (255)
            0x35, 0x00,                    // Physical Minimum (0)
            0x46, 0xff, 0xff,              // Physical Maximum (65535)
            0x75, 0x08,                    // Report Size (8)
            0x95, 0x01,                    // Report Count (1)
            0x81, 0x02,                    // Input (Data,Var,Abs)
            0x15, 0xff,                    // Logical Minimum (-1)
            0x81, 0x02,                    // Input (Data,Var,Abs)
        ];
        let tables = parse(&bytes).unwrap();
        let globals = &tables.report_items[0].globals;
        assert_eq!(globals.logical_maximum, LogicalMaximum(255));
        assert_eq!(globals.physical_maximum, PhysicalMaximum(65535));
        let globals = &tables.report_items[1].globals;
        assert_eq!(globals.logical_minimum, LogicalMinimum(-1));
        assert_eq!(globals.logical_maximum, LogicalMaximum(-1));
    }

    #[test]
    fn extended_usages() {
        #[rustfmt::skip]
        let bytes = [
            0x05, 0x01,                    // Usage Page (Generic Desktop)
            0x0b, 0x38, 0x02, 0x0c, 0x00,  // Usage (Consumer, AC Pan)
            0x09, 0x38,                    // Usage (Wheel)
            0x75, 0x08,                    // Report Size (8)
            0x95, 0x02,                    // Report Count (2)
            0x81, 0x06,                    // Input (Data,Var,Rel)
        ];
        let tables = parse(&bytes).unwrap();
        assert_eq!(
            tables.usage_items,
            vec![
                UsageItem::Usage {
                    usage_page: UsagePage(0x0c),
                    usage_id: UsageId(0x238),
                },
                UsageItem::Usage {
                    usage_page: UsagePage(0x01),
                    usage_id: UsageId(0x38),
                },
            ]
        );
    }

    #[test]
    fn usage_page_applies_at_main_item() {
        #[rustfmt::skip]
        let bytes = [
            0x09, 0x30,                    // Usage (0x30)
            0x05, 0x01,                    // Usage Page (Generic Desktop)
            0x75, 0x08,                    // Report Size (8)
            0x95, 0x01,                    // Report Count (1)
            0x81, 0x02,                    // Input (Data,Var,Abs)
        ];
        let tables = parse(&bytes).unwrap();
        assert_eq!(tables.usage_items[0].usage_page(), UsagePage(0x01));
    }

    #[test]
    fn unmatched_usage_minimum() {
        #[rustfmt::skip]
        let bytes = [
            0x05, 0x09,                    // Usage Page (Button)
            0x19, 0x01,                    // Usage Minimum (1)
            0x75, 0x01,                    // Report Size (1)
            0x95, 0x08,                    // Report Count (8)
            0x81, 0x02,                    // Input (Data,Var,Abs)
            0x29, 0x08,                    // Usage Maximum (8)
            0x81, 0x02,                    // Input (Data,Var,Abs)
        ];
        let tables = parse(&bytes).unwrap();
        assert!(tables.usage_items.is_empty());
        assert_eq!(tables.report_items[0].usage_item_count, 0);
        assert_eq!(tables.report_items[1].usage_item_count, 0);
    }

    #[test]
    fn delimiters() {
        #[rustfmt::skip]
        let bytes = [
            0x05, 0x01,                    // Usage Page (Generic Desktop)
            0xa9, 0x01,                    // Delimiter (Open)
            0x09, 0x30,                    //   Usage (X)
            0x09, 0x33,                    //   Usage (Rx)
            0x19, 0x40,                    //   Usage Minimum (0x40)
            0x29, 0x41,                    //   Usage Maximum (0x41)
            0xa9, 0x00,                    // Delimiter (Close)
            0x09, 0x31,                    // Usage (Y)
            0x75, 0x08,                    // Report Size (8)
            0x95, 0x02,                    // Report Count (2)
            0x81, 0x02,                    // Input (Data,Var,Abs)
        ];
        let tables = parse(&bytes).unwrap();
        assert_eq!(tables.usage_items.len(), 2);
        assert_eq!(
            tables.usage_items[0],
            UsageItem::Usage {
                usage_page: UsagePage(0x01),
                usage_id: UsageId(0x30),
            }
        );
        assert_eq!(
            tables.usage_items[1],
            UsageItem::Usage {
                usage_page: UsagePage(0x01),
                usage_id: UsageId(0x31),
            }
        );
    }

    #[test]
    fn delimiter_drops_pending_usage_minimum() {
        #[rustfmt::skip]
        let bytes = [
            0x05, 0x01,                    // Usage Page (Generic Desktop)
            0xa9, 0x01,                    // Delimiter (Open)
            0x19, 0x10,                    //   Usage Minimum (0x10)
            0x09, 0x30,                    //   Usage (X)
            0xa9, 0x00,                    // Delimiter (Close)
            0x29, 0x20,                    // Usage Maximum (0x20)
            0x75, 0x08,                    // Report Size (8)
            0x95, 0x01,                    // Report Count (1)
            0x81, 0x02,                    // Input (Data,Var,Abs)
        ];
        let tables = parse(&bytes).unwrap();
        assert_eq!(
            tables.usage_items,
            vec![UsageItem::Usage {
                usage_page: UsagePage(0x01),
                usage_id: UsageId(0x30),
            }]
        );
    }

    #[test]
    fn repeated_range_halves() {
        #[rustfmt::skip]
        let bytes = [
            0x05, 0x09,                    // Usage Page (Button)
            0x19, 0x01,                    // Usage Minimum (1)
            0x19, 0x05,                    // Usage Minimum (5)
            0x29, 0x08,                    // Usage Maximum (8)
            0x89, 0x01,                    // String Minimum (1)
            0x89, 0x02,                    // String Minimum (2)
            0x99, 0x03,                    // String Maximum (3)
            0x75, 0x01,                    // Report Size (1)
            0x95, 0x04,                    // Report Count (4)
            0x81, 0x02,                    // Input (Data,Var,Abs)
        ];
        let tables = parse(&bytes).unwrap();
        assert_eq!(
            tables.usage_items,
            vec![UsageItem::Range {
                usage_page: UsagePage(0x09),
                minimum: UsageMinimum(5),
                maximum: UsageMaximum(8),
            }]
        );
        assert_eq!(
            tables.string_items,
            vec![IndexItem::Range {
                minimum: 2,
                maximum: 3
            }]
        );
    }

    #[test]
    fn invalid_delimiters() {
        // nested
        assert!(parse(&[0xa9, 0x01, 0xa9, 0x01]).is_err());
        // close without open
        assert!(parse(&[0xa9, 0x00]).is_err());
        // main item inside the set
        assert!(parse(&[0xa9, 0x01, 0x81, 0x02]).is_err());
        // never closed
        assert!(parse(&[0xa9, 0x01, 0x09, 0x30]).is_err());
        // neither open nor close
        assert!(parse(&[0xa9, 0x02]).is_err());
    }

    #[test]
    fn strings_and_designators() {
        #[rustfmt::skip]
        let bytes = [
            0x79, 0x04,                    // String Index (4)
            0x89, 0x05,                    // String Minimum (5)
            0x99, 0x07,                    // String Maximum (7)
            0x39, 0x02,                    // Designator Index (2)
            0x75, 0x08,                    // Report Size (8)
            0x95, 0x01,                    // Report Count (1)
            0x81, 0x02,                    // Input (Data,Var,Abs)
            0x81, 0x02,                    // Input (Data,Var,Abs)
        ];
        let tables = parse(&bytes).unwrap();
        assert_eq!(
            tables.string_items,
            vec![
                IndexItem::Index(4),
                IndexItem::Range {
                    minimum: 5,
                    maximum: 7
                }
            ]
        );
        assert_eq!(tables.designator_items, vec![IndexItem::Index(2)]);
        let item = &tables.report_items[0];
        assert_eq!((item.first_string_item, item.string_item_count), (0, 2));
        assert_eq!((item.first_designator_item, item.designator_item_count), (0, 1));
        // locals were reset by the first main item
        let item = &tables.report_items[1];
        assert_eq!(item.string_item_count, 0);
        assert_eq!(item.designator_item_count, 0);
    }

    #[test]
    fn reserved_and_long_items_are_skipped() {
        #[rustfmt::skip]
        let bytes = [
            0xc4,                          // Reserved global item
            0xf8,                          // Reserved local item
            0xfe, 0x01, 0xf0, 0x00,        // Long item
            0x75, 0x08,                    // Report Size (8)
            0x95, 0x01,                    // Report Count (1)
            0x81, 0x02,                    // Input (Data,Var,Abs)
        ];
        let tables = parse(&bytes).unwrap();
        assert_eq!(tables.report_items.len(), 1);
    }
}
