use core::str;

use crate::{DtError, node::NodeId, parse::DeviceTree};

/// A typed device tree property.
///
/// Known property names get a typed variant; anything else lands in
/// [`Property::Other`] with its raw value. Raw byte slices alias the FDT
/// blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property<'blob> {
    Compatible(&'blob [u8]),
    Model(&'blob str),
    Phandle(u32),
    Status(&'blob str),
    AddressCells(u32),
    SizeCells(u32),
    Reg(&'blob [u8]),
    Ranges(&'blob [u8]),
    DmaRanges(&'blob [u8]),
    DmaCoherent,
    DmaNoncoherent,
    Interrupts(&'blob [u8]),
    InterruptParent(u32),
    InterruptsExtended(&'blob [u8]),
    InterruptCells(u32),
    InterruptController,
    InterruptMap(&'blob [u8]),
    InterruptMapMask(&'blob [u8]),
    ClockFrequency(u64),
    TimebaseFrequency(u64),
    Other {
        name: &'blob str,
        value: &'blob [u8],
    },
}

impl<'blob> Property<'blob> {
    pub(crate) fn parse(name: &'blob str, value: &'blob [u8]) -> Result<Self, DtError> {
        let prop = match name {
            "compatible" => Self::Compatible(value),
            "model" => Self::Model(prop_str(value)?),
            "phandle" => Self::Phandle(prop_u32(value)?),
            "status" => Self::Status(prop_str(value)?),
            "#address-cells" => Self::AddressCells(prop_u32(value)?),
            "#size-cells" => Self::SizeCells(prop_u32(value)?),
            "reg" => Self::Reg(value),
            "ranges" => Self::Ranges(value),
            "dma-ranges" => Self::DmaRanges(value),
            "dma-coherent" => Self::DmaCoherent,
            "dma-noncoherent" => Self::DmaNoncoherent,
            "interrupts" => Self::Interrupts(value),
            "interrupt-parent" => Self::InterruptParent(prop_u32(value)?),
            "interrupts-extended" => Self::InterruptsExtended(value),
            "#interrupt-cells" => Self::InterruptCells(prop_u32(value)?),
            "interrupt-controller" => Self::InterruptController,
            "interrupt-map" => Self::InterruptMap(value),
            "interrupt-map-mask" => Self::InterruptMapMask(value),
            "clock-frequency" => Self::ClockFrequency(prop_u32_or_u64(value)?),
            "timebase-frequency" => Self::TimebaseFrequency(prop_u32_or_u64(value)?),
            _ => Self::Other { name, value },
        };
        Ok(prop)
    }

    #[must_use]
    pub fn name(&self) -> &'blob str {
        match self {
            Self::Compatible(_) => "compatible",
            Self::Model(_) => "model",
            Self::Phandle(_) => "phandle",
            Self::Status(_) => "status",
            Self::AddressCells(_) => "#address-cells",
            Self::SizeCells(_) => "#size-cells",
            Self::Reg(_) => "reg",
            Self::Ranges(_) => "ranges",
            Self::DmaRanges(_) => "dma-ranges",
            Self::DmaCoherent => "dma-coherent",
            Self::DmaNoncoherent => "dma-noncoherent",
            Self::Interrupts(_) => "interrupts",
            Self::InterruptParent(_) => "interrupt-parent",
            Self::InterruptsExtended(_) => "interrupts-extended",
            Self::InterruptCells(_) => "#interrupt-cells",
            Self::InterruptController => "interrupt-controller",
            Self::InterruptMap(_) => "interrupt-map",
            Self::InterruptMapMask(_) => "interrupt-map-mask",
            Self::ClockFrequency(_) => "clock-frequency",
            Self::TimebaseFrequency(_) => "timebase-frequency",
            Self::Other { name, .. } => name,
        }
    }
}

/// Scalar cells are big-endian u32.
fn prop_u32(value: &[u8]) -> Result<u32, DtError> {
    let bytes = value.try_into().map_err(|_| DtError::InvalidDeviceTree)?;
    Ok(u32::from_be_bytes(bytes))
}

/// Frequencies are u32 or u64 depending on payload length.
fn prop_u32_or_u64(value: &[u8]) -> Result<u64, DtError> {
    match value.len() {
        4 => prop_u32(value).map(u64::from),
        8 => {
            let bytes = value.try_into().map_err(|_| DtError::InvalidDeviceTree)?;
            Ok(u64::from_be_bytes(bytes))
        }
        _ => Err(DtError::InvalidDeviceTree),
    }
}

/// A single NUL-terminated string value.
fn prop_str(value: &[u8]) -> Result<&str, DtError> {
    let [rest @ .., 0] = value else {
        return Err(DtError::InvalidDeviceTree);
    };
    str::from_utf8(rest).map_err(|_| DtError::InvalidDeviceTree)
}

/// Iterator over the NUL-terminated strings of a `compatible` list.
#[derive(Debug, Clone)]
pub struct CompatibleIter<'blob> {
    rest: &'blob [u8],
}

impl<'blob> CompatibleIter<'blob> {
    pub(crate) fn new(bytes: &'blob [u8]) -> Self {
        Self { rest: bytes }
    }
}

impl<'blob> Iterator for CompatibleIter<'blob> {
    type Item = &'blob str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let end = self.rest.iter().position(|&b| b == 0)?;
        let (s, rest) = self.rest.split_at(end);
        self.rest = &rest[1..];
        str::from_utf8(s).ok()
    }
}

/// One `(address, size)` tuple of a `reg` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegEntry {
    pub addr: u64,
    pub size: u64,
}

/// Iterator over the `(address, size)` tuples of a `reg` property.
///
/// Constructed by [`DeviceTree::reg`], which validates the cell counts and
/// the payload length up front, so iteration itself cannot fail.
#[derive(Debug, Clone)]
pub struct RegIter<'blob> {
    rest: &'blob [u8],
    addr_cells: u32,
    size_cells: u32,
}

impl<'blob> RegIter<'blob> {
    pub(crate) fn new(bytes: &'blob [u8], addr_cells: u32, size_cells: u32) -> Self {
        Self {
            rest: bytes,
            addr_cells,
            size_cells,
        }
    }
}

/// Reads one 1- or 2-cell big-endian value off the front of `rest`.
pub(crate) fn take_cells(rest: &mut &[u8], cells: u32) -> u64 {
    let len = cells as usize * 4;
    let (head, tail) = rest.split_at(len);
    *rest = tail;
    match cells {
        1 => u64::from(u32::from_be_bytes(head.try_into().unwrap())),
        2 => u64::from_be_bytes(head.try_into().unwrap()),
        _ => unreachable!("cell counts are validated to 1 or 2"),
    }
}

impl Iterator for RegIter<'_> {
    type Item = RegEntry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let addr = take_cells(&mut self.rest, self.addr_cells);
        let size = take_cells(&mut self.rest, self.size_cells);
        Some(RegEntry { addr, size })
    }
}

/// One entry of an `interrupts-extended` property: the resolved interrupt
/// parent and the first specifier cell(s) as a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptSpec {
    pub parent: NodeId,
    pub specifier: u64,
}

/// Iterator over `interrupts-extended` entries.
///
/// Each entry names its interrupt parent by phandle; the specifier width
/// comes from that parent's `#interrupt-cells`, so resolution can fail per
/// entry and items are `Result`s.
#[derive(Debug, Clone)]
pub struct InterruptsExtendedIter<'a, 'blob> {
    dt: &'a DeviceTree<'blob>,
    rest: &'blob [u8],
    failed: bool,
}

impl<'a, 'blob> InterruptsExtendedIter<'a, 'blob> {
    pub(crate) fn new(dt: &'a DeviceTree<'blob>, bytes: &'blob [u8]) -> Self {
        Self {
            dt,
            rest: bytes,
            failed: false,
        }
    }

    fn next_entry(&mut self) -> Result<InterruptSpec, DtError> {
        if self.rest.len() < 4 {
            return Err(DtError::InvalidCellCounts);
        }
        let phandle = u32::from_be_bytes(self.rest[..4].try_into().unwrap());
        self.rest = &self.rest[4..];

        let parent = self
            .dt
            .phandle(phandle)
            .ok_or(DtError::InvalidDeviceTree)?;
        let cells = self
            .dt
            .node(parent)
            .interrupt_cells()
            .ok_or(DtError::InvalidDeviceTree)?;
        if !matches!(cells, 1 | 2) {
            return Err(DtError::UnsupportedCellSize);
        }
        if self.rest.len() < cells as usize * 4 {
            return Err(DtError::InvalidCellCounts);
        }
        let specifier = take_cells(&mut self.rest, cells);
        Ok(InterruptSpec { parent, specifier })
    }
}

impl Iterator for InterruptsExtendedIter<'_, '_> {
    type Item = Result<InterruptSpec, DtError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.rest.is_empty() {
            return None;
        }
        let entry = self.next_entry();
        if entry.is_err() {
            self.failed = true;
        }
        Some(entry)
    }
}
