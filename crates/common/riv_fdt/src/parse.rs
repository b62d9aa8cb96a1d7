use arrayvec::ArrayVec;
use strum::FromRepr;

use crate::{
    DtError, MAX_DEPTH, MAX_NODES,
    node::{Node, NodeId},
    prop::{InterruptsExtendedIter, Property, RegEntry, RegIter},
};

const FDT_MAGIC: u32 = 0xD00D_FEED;
const HEADER_SIZE: usize = 40;

/// Header fields, by 32-bit word index.
const HDR_MAGIC: usize = 0;
const HDR_TOTAL_SIZE: usize = 1;
const HDR_OFF_STRUCT: usize = 2;
const HDR_OFF_STRINGS: usize = 3;
const HDR_OFF_MEM_RSVMAP: usize = 4;

/// Structure block tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u32)]
enum Token {
    BeginNode = 1,
    EndNode = 2,
    Prop = 3,
    Nop = 4,
    End = 9,
}

fn be32(blob: &[u8], offset: usize) -> Result<u32, DtError> {
    let bytes = blob
        .get(offset..offset + 4)
        .ok_or(DtError::Truncated)?
        .try_into()
        .unwrap();
    Ok(u32::from_be_bytes(bytes))
}

fn be64(blob: &[u8], offset: usize) -> Result<u64, DtError> {
    let bytes = blob
        .get(offset..offset + 8)
        .ok_or(DtError::Truncated)?
        .try_into()
        .unwrap();
    Ok(u64::from_be_bytes(bytes))
}

/// NUL-terminated string starting at `offset`.
fn cstr(blob: &[u8], offset: usize) -> Result<&str, DtError> {
    let tail = blob.get(offset..).ok_or(DtError::Truncated)?;
    let end = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or(DtError::Truncated)?;
    core::str::from_utf8(&tail[..end]).map_err(|_| DtError::InvalidDeviceTree)
}

const fn align4(offset: usize) -> usize {
    (offset + 3) & !3
}

/// A parsed device tree.
///
/// Built once at boot from the FDT bytes, immutable thereafter. Nodes live
/// in a flat vector indexed by [`NodeId`]; parent/child relations are ids,
/// never pointers.
#[derive(Debug)]
pub struct DeviceTree<'blob> {
    blob: &'blob [u8],
    nodes: ArrayVec<Node<'blob>, MAX_NODES>,
    phandles: ArrayVec<(u32, NodeId), MAX_NODES>,
    mem_rsvmap: usize,
}

impl<'blob> DeviceTree<'blob> {
    /// Parses an FDT image.
    ///
    /// The slice must cover at least `total_size` bytes of the blob; the
    /// parsed tree borrows it.
    pub fn parse(blob: &'blob [u8]) -> Result<Self, DtError> {
        if blob.len() < HEADER_SIZE {
            return Err(DtError::Truncated);
        }
        if be32(blob, HDR_MAGIC * 4)? != FDT_MAGIC {
            return Err(DtError::MagicMismatch);
        }
        let total_size = be32(blob, HDR_TOTAL_SIZE * 4)? as usize;
        if total_size < HEADER_SIZE || total_size > blob.len() {
            return Err(DtError::Truncated);
        }
        let blob = &blob[..total_size];

        let struct_off = be32(blob, HDR_OFF_STRUCT * 4)? as usize;
        let strings_off = be32(blob, HDR_OFF_STRINGS * 4)? as usize;
        let mem_rsvmap = be32(blob, HDR_OFF_MEM_RSVMAP * 4)? as usize;

        let mut dt = Self {
            blob,
            nodes: ArrayVec::new(),
            phandles: ArrayVec::new(),
            mem_rsvmap,
        };
        dt.walk_structure(struct_off, strings_off)?;
        Ok(dt)
    }

    /// Parses an FDT image given only its base pointer, taking the length
    /// from the header. This is how the kernel ingests the firmware blob.
    ///
    /// # Safety
    ///
    /// `ptr` must point at a word-aligned FDT image that stays mapped and
    /// unmodified for `'blob`.
    pub unsafe fn from_ptr(ptr: *const u8) -> Result<Self, DtError> {
        let header = unsafe { core::slice::from_raw_parts(ptr, HEADER_SIZE) };
        if be32(header, HDR_MAGIC * 4)? != FDT_MAGIC {
            return Err(DtError::MagicMismatch);
        }
        let total_size = be32(header, HDR_TOTAL_SIZE * 4)? as usize;
        let blob = unsafe { core::slice::from_raw_parts(ptr, total_size) };
        Self::parse(blob)
    }

    /// Walks the structure token stream, building the node vector.
    ///
    /// The top-level stream must open with exactly one `BeginNode` with an
    /// empty name and close with `End`.
    fn walk_structure(&mut self, struct_off: usize, strings_off: usize) -> Result<(), DtError> {
        let mut offset = struct_off;
        let mut stack: ArrayVec<NodeId, MAX_DEPTH> = ArrayVec::new();
        let mut root_closed = false;

        loop {
            let raw = be32(self.blob, offset)?;
            offset += 4;
            let token = Token::from_repr(raw).ok_or(DtError::InvalidDeviceTree)?;

            match token {
                Token::Nop => {}
                Token::BeginNode => {
                    if root_closed {
                        return Err(DtError::InvalidDeviceTree);
                    }
                    let name = cstr(self.blob, offset)?;
                    offset = align4(offset + name.len() + 1);

                    let parent = stack.last().copied();
                    if self.nodes.is_empty() {
                        if parent.is_some() || !name.is_empty() {
                            return Err(DtError::InvalidDeviceTree);
                        }
                    } else if parent.is_none() {
                        return Err(DtError::InvalidDeviceTree);
                    }

                    let id = NodeId::new(self.nodes.len()).ok_or(DtError::CapacityExceeded)?;
                    self.nodes
                        .try_push(Node::new(name, parent))
                        .map_err(|_| DtError::CapacityExceeded)?;
                    if let Some(parent) = parent {
                        self.nodes[parent.index()]
                            .children
                            .try_push((name, id))
                            .map_err(|_| DtError::CapacityExceeded)?;
                    }
                    stack.try_push(id).map_err(|_| DtError::CapacityExceeded)?;
                }
                Token::Prop => {
                    let current = *stack.last().ok_or(DtError::InvalidDeviceTree)?;
                    let len = be32(self.blob, offset)? as usize;
                    let name_off = be32(self.blob, offset + 4)? as usize;
                    offset += 8;
                    let value = self
                        .blob
                        .get(offset..offset + len)
                        .ok_or(DtError::Truncated)?;
                    offset = align4(offset + len);

                    let name = cstr(self.blob, strings_off + name_off)?;
                    let prop = Property::parse(name, value)?;
                    if let Property::Phandle(phandle) = prop {
                        self.phandles
                            .try_push((phandle, current))
                            .map_err(|_| DtError::CapacityExceeded)?;
                    }
                    self.nodes[current.index()]
                        .properties
                        .try_push(prop)
                        .map_err(|_| DtError::CapacityExceeded)?;
                }
                Token::EndNode => {
                    if stack.pop().is_none() {
                        return Err(DtError::InvalidDeviceTree);
                    }
                    if stack.is_empty() {
                        root_closed = true;
                    }
                }
                Token::End => {
                    if !root_closed || !stack.is_empty() {
                        return Err(DtError::InvalidDeviceTree);
                    }
                    return Ok(());
                }
            }
        }
    }

    /// The exact blob the tree was parsed from (`total_size` bytes).
    #[must_use]
    pub fn blob(&self) -> &'blob [u8] {
        self.blob
    }

    #[must_use]
    pub fn root(&self) -> &Node<'blob> {
        &self.nodes[NodeId::ROOT.index()]
    }

    /// # Panics
    ///
    /// Panics if `id` did not come from this tree.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node<'blob> {
        &self.nodes[id.index()]
    }

    /// All node ids, in document (preorder) order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(|i| NodeId::new(i).unwrap())
    }

    #[must_use]
    pub fn phandle(&self, phandle: u32) -> Option<NodeId> {
        self.phandles
            .iter()
            .find(|&&(p, _)| p == phandle)
            .map(|&(_, id)| id)
    }

    /// Resolves an absolute path like `/soc/plic@c000000`. Segments without
    /// a unit address match regardless of the child's unit address.
    #[must_use]
    pub fn find_by_path(&self, path: &str) -> Option<NodeId> {
        let mut id = NodeId::ROOT;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            id = self.node(id).child(segment)?;
        }
        Some(id)
    }

    /// Nearest ancestor's `#address-cells`; `None` if no ancestor defines
    /// one.
    #[must_use]
    pub fn effective_address_cells(&self, id: NodeId) -> Option<u32> {
        let mut cursor = self.node(id).parent();
        while let Some(ancestor) = cursor {
            let node = self.node(ancestor);
            if let Some(cells) = node.address_cells() {
                return Some(cells);
            }
            cursor = node.parent();
        }
        None
    }

    /// Nearest ancestor's `#size-cells`; `None` if no ancestor defines one.
    #[must_use]
    pub fn effective_size_cells(&self, id: NodeId) -> Option<u32> {
        let mut cursor = self.node(id).parent();
        while let Some(ancestor) = cursor {
            let node = self.node(ancestor);
            if let Some(cells) = node.size_cells() {
                return Some(cells);
            }
            cursor = node.parent();
        }
        None
    }

    /// The `(address, size)` tuples of a node's `reg` property, with cell
    /// counts resolved from the node's ancestry.
    pub fn reg(&self, id: NodeId) -> Result<RegIter<'blob>, DtError> {
        let bytes = self
            .node(id)
            .reg_bytes()
            .ok_or(DtError::InvalidDeviceTree)?;
        let addr_cells = self
            .effective_address_cells(id)
            .ok_or(DtError::InvalidDeviceTree)?;
        let size_cells = self
            .effective_size_cells(id)
            .ok_or(DtError::InvalidDeviceTree)?;
        if !matches!(addr_cells, 1 | 2) || !matches!(size_cells, 1 | 2) {
            return Err(DtError::UnsupportedCellSize);
        }
        let tuple = (addr_cells + size_cells) as usize * 4;
        if bytes.len() % tuple != 0 {
            return Err(DtError::InvalidCellCounts);
        }
        Ok(RegIter::new(bytes, addr_cells, size_cells))
    }

    /// The phandle-resolved entries of a node's `interrupts-extended`
    /// property.
    pub fn interrupts_extended(
        &self,
        id: NodeId,
    ) -> Result<InterruptsExtendedIter<'_, 'blob>, DtError> {
        let bytes = self
            .node(id)
            .interrupts_extended_bytes()
            .ok_or(DtError::InvalidDeviceTree)?;
        Ok(InterruptsExtendedIter::new(self, bytes))
    }

    /// The node's first interrupt specifier. `interrupts-extended` takes
    /// precedence; plain `interrupts` contributes its first cell.
    #[must_use]
    pub fn first_interrupt(&self, id: NodeId) -> Option<u64> {
        if self.node(id).interrupts_extended_bytes().is_some() {
            let spec = self.interrupts_extended(id).ok()?.next()?.ok()?;
            return Some(spec.specifier);
        }
        match self.node(id).property("interrupts") {
            Some(Property::Interrupts(bytes)) if bytes.len() >= 4 => Some(u64::from(
                u32::from_be_bytes(bytes[..4].try_into().unwrap()),
            )),
            _ => None,
        }
    }

    /// Entries of the memory reservation block: regions firmware wants
    /// kept out of the page allocator.
    #[must_use]
    pub fn reserved_regions(&self) -> ReservedRegions<'blob> {
        ReservedRegions {
            blob: self.blob,
            offset: self.mem_rsvmap,
        }
    }
}

/// Iterator over the memory reservation block.
#[derive(Debug, Clone)]
pub struct ReservedRegions<'blob> {
    blob: &'blob [u8],
    offset: usize,
}

impl Iterator for ReservedRegions<'_> {
    type Item = RegEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let addr = be64(self.blob, self.offset).ok()?;
        let size = be64(self.blob, self.offset + 8).ok()?;
        self.offset += 16;
        if addr == 0 && size == 0 {
            return None;
        }
        Some(RegEntry { addr, size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds FDT blobs the way firmware lays them out: header, memory
    /// reservation block, structure block, strings block.
    struct TreeBuilder {
        structure: Vec<u8>,
        strings: Vec<u8>,
        reservations: Vec<(u64, u64)>,
    }

    impl TreeBuilder {
        fn new() -> Self {
            Self {
                structure: Vec::new(),
                strings: Vec::new(),
                reservations: Vec::new(),
            }
        }

        fn push_token(&mut self, token: u32) -> &mut Self {
            self.structure.extend_from_slice(&token.to_be_bytes());
            self
        }

        fn pad(&mut self) {
            while self.structure.len() % 4 != 0 {
                self.structure.push(0);
            }
        }

        fn string_offset(&mut self, name: &str) -> u32 {
            let offset = self.strings.len() as u32;
            self.strings.extend_from_slice(name.as_bytes());
            self.strings.push(0);
            offset
        }

        fn begin_node(&mut self, name: &str) -> &mut Self {
            self.push_token(1);
            self.structure.extend_from_slice(name.as_bytes());
            self.structure.push(0);
            self.pad();
            self
        }

        fn end_node(&mut self) -> &mut Self {
            self.push_token(2)
        }

        fn prop(&mut self, name: &str, value: &[u8]) -> &mut Self {
            let name_off = self.string_offset(name);
            self.push_token(3);
            self.structure
                .extend_from_slice(&(value.len() as u32).to_be_bytes());
            self.structure.extend_from_slice(&name_off.to_be_bytes());
            self.structure.extend_from_slice(value);
            self.pad();
            self
        }

        fn prop_u32(&mut self, name: &str, value: u32) -> &mut Self {
            self.prop(name, &value.to_be_bytes())
        }

        fn reserve(&mut self, addr: u64, size: u64) -> &mut Self {
            self.reservations.push((addr, size));
            self
        }

        fn finish(&mut self) -> Vec<u8> {
            self.push_token(9);

            let off_rsvmap = HEADER_SIZE;
            let rsvmap_len = (self.reservations.len() + 1) * 16;
            let off_struct = off_rsvmap + rsvmap_len;
            let off_strings = off_struct + self.structure.len();
            let total_size = off_strings + self.strings.len();

            let mut blob = Vec::with_capacity(total_size);
            for word in [
                FDT_MAGIC,
                total_size as u32,
                off_struct as u32,
                off_strings as u32,
                off_rsvmap as u32,
                17, // version
                16, // last_comp_version
                0,  // boot_cpuid_phys
                self.strings.len() as u32,
                self.structure.len() as u32,
            ] {
                blob.extend_from_slice(&word.to_be_bytes());
            }
            for &(addr, size) in &self.reservations {
                blob.extend_from_slice(&addr.to_be_bytes());
                blob.extend_from_slice(&size.to_be_bytes());
            }
            blob.extend_from_slice(&[0; 16]);
            blob.extend_from_slice(&self.structure);
            blob.extend_from_slice(&self.strings);
            blob
        }
    }

    fn minimal_tree() -> Vec<u8> {
        let mut b = TreeBuilder::new();
        b.begin_node("");
        b.prop_u32("#address-cells", 1);
        b.prop_u32("#size-cells", 1);
        b.begin_node("memory@0");
        let mut reg = Vec::new();
        reg.extend_from_slice(&0u32.to_be_bytes());
        reg.extend_from_slice(&0x1000u32.to_be_bytes());
        b.prop("reg", &reg);
        b.end_node();
        b.end_node();
        b.finish()
    }

    #[test]
    fn parses_minimal_tree() {
        let blob = minimal_tree();
        let dt = DeviceTree::parse(&blob).unwrap();

        assert_eq!(dt.nodes().count(), 2);
        let memory = dt.find_by_path("/memory").unwrap();
        assert_eq!(dt.node(memory).name(), "memory@0");
        assert_eq!(dt.node(memory).parent(), Some(NodeId::ROOT));

        let regs: Vec<_> = dt.reg(memory).unwrap().collect();
        assert_eq!(regs, [RegEntry { addr: 0, size: 0x1000 }]);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut blob = minimal_tree();
        blob[0] = 0xFF;
        assert_eq!(DeviceTree::parse(&blob).unwrap_err(), DtError::MagicMismatch);
    }

    #[test]
    fn rejects_truncated_blob() {
        let blob = minimal_tree();
        assert_eq!(
            DeviceTree::parse(&blob[..HEADER_SIZE - 4]).unwrap_err(),
            DtError::Truncated
        );
    }

    #[test]
    fn rejects_unknown_token() {
        let mut b = TreeBuilder::new();
        b.begin_node("").push_token(7).end_node();
        assert_eq!(DeviceTree::parse(&b.finish()).unwrap_err(), DtError::InvalidDeviceTree);
    }

    #[test]
    fn rejects_nonempty_root_name() {
        let mut b = TreeBuilder::new();
        b.begin_node("root").end_node();
        assert_eq!(DeviceTree::parse(&b.finish()).unwrap_err(), DtError::InvalidDeviceTree);
    }

    #[test]
    fn rejects_second_top_level_node() {
        let mut b = TreeBuilder::new();
        b.begin_node("").end_node();
        b.begin_node("other").end_node();
        assert_eq!(DeviceTree::parse(&b.finish()).unwrap_err(), DtError::InvalidDeviceTree);
    }

    #[test]
    fn reg_rejects_unaligned_length() {
        let mut b = TreeBuilder::new();
        b.begin_node("");
        b.prop_u32("#address-cells", 1);
        b.prop_u32("#size-cells", 1);
        b.begin_node("memory@0");
        b.prop("reg", &[0; 12]); // 1+1 cells = 8-byte tuples
        b.end_node();
        b.end_node();
        let blob = b.finish();
        let dt = DeviceTree::parse(&blob).unwrap();
        let memory = dt.find_by_path("/memory").unwrap();
        assert_eq!(dt.reg(memory).unwrap_err(), DtError::InvalidCellCounts);
    }

    #[test]
    fn reg_rejects_wide_cells() {
        let mut b = TreeBuilder::new();
        b.begin_node("");
        b.prop_u32("#address-cells", 3);
        b.prop_u32("#size-cells", 1);
        b.begin_node("memory@0");
        b.prop("reg", &[0; 16]);
        b.end_node();
        b.end_node();
        let blob = b.finish();
        let dt = DeviceTree::parse(&blob).unwrap();
        let memory = dt.find_by_path("/memory").unwrap();
        assert_eq!(dt.reg(memory).unwrap_err(), DtError::UnsupportedCellSize);
    }

    #[test]
    fn cell_counts_inherit_from_nearest_ancestor() {
        let mut b = TreeBuilder::new();
        b.begin_node("");
        b.prop_u32("#address-cells", 2);
        b.prop_u32("#size-cells", 2);
        b.begin_node("soc");
        // #address-cells only: size cells must keep walking up.
        b.prop_u32("#address-cells", 1);
        b.begin_node("dev@10");
        let mut reg = Vec::new();
        reg.extend_from_slice(&0x10u32.to_be_bytes());
        reg.extend_from_slice(&0x20u64.to_be_bytes());
        b.prop("reg", &reg);
        b.end_node();
        b.end_node();
        b.end_node();
        let blob = b.finish();
        let dt = DeviceTree::parse(&blob).unwrap();

        let dev = dt.find_by_path("/soc/dev").unwrap();
        assert_eq!(dt.effective_address_cells(dev), Some(1));
        assert_eq!(dt.effective_size_cells(dev), Some(2));
        let regs: Vec<_> = dt.reg(dev).unwrap().collect();
        assert_eq!(regs, [RegEntry {
            addr: 0x10,
            size: 0x20
        }]);
    }

    #[test]
    fn resolves_phandles_and_interrupts_extended() {
        let mut b = TreeBuilder::new();
        b.begin_node("");
        b.begin_node("plic@c000000");
        b.prop_u32("phandle", 3);
        b.prop_u32("#interrupt-cells", 1);
        b.prop("interrupt-controller", &[]);
        b.end_node();
        b.begin_node("uart@10000000");
        let mut intx = Vec::new();
        intx.extend_from_slice(&3u32.to_be_bytes()); // phandle
        intx.extend_from_slice(&10u32.to_be_bytes()); // specifier
        b.prop("interrupts-extended", &intx);
        b.end_node();
        b.end_node();
        let blob = b.finish();
        let dt = DeviceTree::parse(&blob).unwrap();

        let plic = dt.find_by_path("/plic").unwrap();
        assert!(dt.node(plic).is_interrupt_controller());
        assert_eq!(dt.phandle(3), Some(plic));

        let uart = dt.find_by_path("/uart").unwrap();
        let specs: Vec<_> = dt
            .interrupts_extended(uart)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(specs, [crate::InterruptSpec {
            parent: plic,
            specifier: 10
        }]);
        assert_eq!(dt.first_interrupt(uart), Some(10));
    }

    #[test]
    fn plain_interrupts_yield_their_first_cell() {
        let mut b = TreeBuilder::new();
        b.begin_node("");
        b.begin_node("uart@10000000");
        b.prop_u32("interrupts", 0x0A);
        b.end_node();
        b.end_node();
        let blob = b.finish();
        let dt = DeviceTree::parse(&blob).unwrap();

        let uart = dt.find_by_path("/uart").unwrap();
        assert_eq!(dt.first_interrupt(uart), Some(10));
        assert_eq!(dt.first_interrupt(NodeId::ROOT), None);
    }

    #[test]
    fn unresolved_phandle_is_invalid() {
        let mut b = TreeBuilder::new();
        b.begin_node("");
        b.begin_node("uart@10000000");
        let mut intx = Vec::new();
        intx.extend_from_slice(&9u32.to_be_bytes());
        intx.extend_from_slice(&10u32.to_be_bytes());
        b.prop("interrupts-extended", &intx);
        b.end_node();
        b.end_node();
        let blob = b.finish();
        let dt = DeviceTree::parse(&blob).unwrap();

        let uart = dt.find_by_path("/uart").unwrap();
        let err = dt.interrupts_extended(uart).unwrap().next().unwrap();
        assert_eq!(err, Err(DtError::InvalidDeviceTree));
    }

    #[test]
    fn compatible_lists_all_strings() {
        let mut b = TreeBuilder::new();
        b.begin_node("");
        b.begin_node("plic@c000000");
        b.prop("compatible", b"sifive,plic-1.0.0\0riscv,plic0\0");
        b.end_node();
        b.end_node();
        let blob = b.finish();
        let dt = DeviceTree::parse(&blob).unwrap();

        let plic = dt.find_by_path("/plic").unwrap();
        let compat: Vec<_> = dt.node(plic).compatible().collect();
        assert_eq!(compat, ["sifive,plic-1.0.0", "riscv,plic0"]);
        assert!(dt.node(plic).compatible_with("riscv,plic0"));
        assert!(!dt.node(plic).compatible_with("riscv,clint0"));
    }

    #[test]
    fn status_gates_nodes() {
        let mut b = TreeBuilder::new();
        b.begin_node("");
        b.begin_node("good");
        b.prop("status", b"okay\0");
        b.end_node();
        b.begin_node("bad");
        b.prop("status", b"disabled\0");
        b.end_node();
        b.begin_node("silent");
        b.end_node();
        b.end_node();
        let blob = b.finish();
        let dt = DeviceTree::parse(&blob).unwrap();

        assert!(dt.node(dt.find_by_path("/good").unwrap()).status_okay());
        assert!(!dt.node(dt.find_by_path("/bad").unwrap()).status_okay());
        assert!(dt.node(dt.find_by_path("/silent").unwrap()).status_okay());
    }

    #[test]
    fn walks_reservation_block() {
        let mut b = TreeBuilder::new();
        b.reserve(0x8000_0000, 0x2_0000);
        b.reserve(0x8800_0000, 0x1000);
        b.begin_node("").end_node();
        let blob = b.finish();
        let dt = DeviceTree::parse(&blob).unwrap();

        let regions: Vec<_> = dt.reserved_regions().collect();
        assert_eq!(regions, [
            RegEntry {
                addr: 0x8000_0000,
                size: 0x2_0000
            },
            RegEntry {
                addr: 0x8800_0000,
                size: 0x1000
            },
        ]);
    }

    #[test]
    fn node_capacity_is_bounded() {
        let mut b = TreeBuilder::new();
        b.begin_node("");
        for i in 0..MAX_NODES {
            b.begin_node(&format!("dev@{i}"));
            b.end_node();
        }
        b.end_node();
        assert_eq!(
            DeviceTree::parse(&b.finish()).unwrap_err(),
            DtError::CapacityExceeded
        );
    }

    #[test]
    fn nesting_depth_is_bounded() {
        let mut b = TreeBuilder::new();
        b.begin_node("");
        for i in 0..MAX_DEPTH {
            b.begin_node(&format!("level{i}"));
        }
        for _ in 0..=MAX_DEPTH {
            b.end_node();
        }
        assert_eq!(
            DeviceTree::parse(&b.finish()).unwrap_err(),
            DtError::CapacityExceeded
        );
    }

    #[test]
    fn frequencies_accept_both_widths() {
        let mut b = TreeBuilder::new();
        b.begin_node("");
        b.begin_node("cpus");
        b.prop_u32("timebase-frequency", 10_000_000);
        b.end_node();
        b.begin_node("uart@10000000");
        b.prop("clock-frequency", &3_686_400u64.to_be_bytes());
        b.end_node();
        b.end_node();
        let blob = b.finish();
        let dt = DeviceTree::parse(&blob).unwrap();

        let cpus = dt.find_by_path("/cpus").unwrap();
        assert_eq!(dt.node(cpus).timebase_frequency(), Some(10_000_000));
        let uart = dt.find_by_path("/uart").unwrap();
        assert_eq!(dt.node(uart).clock_frequency(), Some(3_686_400));
    }
}
