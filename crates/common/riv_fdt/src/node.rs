use arrayvec::ArrayVec;

use crate::{MAX_CHILDREN, MAX_PROPERTIES, prop::CompatibleIter, prop::Property};

/// Dense index of a node in the parsed tree. The root is always id 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u16);

impl NodeId {
    pub const ROOT: Self = Self(0);

    pub(crate) fn new(index: usize) -> Option<Self> {
        u16::try_from(index).ok().map(Self)
    }

    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

/// A single device tree node.
///
/// Children are kept in document order. The parent link is `None` only for
/// the root.
#[derive(Debug)]
pub struct Node<'blob> {
    pub(crate) name: &'blob str,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: ArrayVec<(&'blob str, NodeId), MAX_CHILDREN>,
    pub(crate) properties: ArrayVec<Property<'blob>, MAX_PROPERTIES>,
}

impl<'blob> Node<'blob> {
    pub(crate) fn new(name: &'blob str, parent: Option<NodeId>) -> Self {
        Self {
            name,
            parent,
            children: ArrayVec::new(),
            properties: ArrayVec::new(),
        }
    }

    /// Full node name, including the unit address (e.g. `memory@80000000`).
    #[must_use]
    pub fn name(&self) -> &'blob str {
        self.name
    }

    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> impl Iterator<Item = (&'blob str, NodeId)> + '_ {
        self.children.iter().copied()
    }

    /// Looks up a child by name. A bare name (no `@`) also matches a child
    /// whose unit address differs, so `child("memory")` finds `memory@0`.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<NodeId> {
        self.children
            .iter()
            .find(|(n, _)| {
                *n == name || (!name.contains('@') && n.split('@').next() == Some(name))
            })
            .map(|&(_, id)| id)
    }

    pub fn properties(&self) -> impl Iterator<Item = &Property<'blob>> {
        self.properties.iter()
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Property<'blob>> {
        self.properties.iter().find(|p| p.name() == name)
    }

    /// Iterates the strings of the `compatible` list; empty if absent.
    #[must_use]
    pub fn compatible(&self) -> CompatibleIter<'blob> {
        match self.property("compatible") {
            Some(&Property::Compatible(bytes)) => CompatibleIter::new(bytes),
            _ => CompatibleIter::new(&[]),
        }
    }

    #[must_use]
    pub fn compatible_with(&self, compat: &str) -> bool {
        self.compatible().any(|c| c == compat)
    }

    #[must_use]
    pub fn is_interrupt_controller(&self) -> bool {
        matches!(
            self.property("interrupt-controller"),
            Some(Property::InterruptController)
        )
    }

    /// A node is usable unless a `status` property says otherwise.
    #[must_use]
    pub fn status_okay(&self) -> bool {
        match self.property("status") {
            Some(Property::Status(s)) => matches!(*s, "okay" | "ok"),
            _ => true,
        }
    }

    #[must_use]
    pub fn phandle(&self) -> Option<u32> {
        match self.property("phandle") {
            Some(Property::Phandle(v)) => Some(*v),
            _ => None,
        }
    }

    /// This node's own `#address-cells`, if present.
    #[must_use]
    pub fn address_cells(&self) -> Option<u32> {
        match self.property("#address-cells") {
            Some(Property::AddressCells(v)) => Some(*v),
            _ => None,
        }
    }

    /// This node's own `#size-cells`, if present.
    #[must_use]
    pub fn size_cells(&self) -> Option<u32> {
        match self.property("#size-cells") {
            Some(Property::SizeCells(v)) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn interrupt_cells(&self) -> Option<u32> {
        match self.property("#interrupt-cells") {
            Some(Property::InterruptCells(v)) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn interrupt_parent(&self) -> Option<u32> {
        match self.property("interrupt-parent") {
            Some(Property::InterruptParent(v)) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn model(&self) -> Option<&'blob str> {
        match self.property("model") {
            Some(&Property::Model(s)) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn clock_frequency(&self) -> Option<u64> {
        match self.property("clock-frequency") {
            Some(Property::ClockFrequency(v)) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn timebase_frequency(&self) -> Option<u64> {
        match self.property("timebase-frequency") {
            Some(Property::TimebaseFrequency(v)) => Some(*v),
            _ => None,
        }
    }

    pub(crate) fn reg_bytes(&self) -> Option<&'blob [u8]> {
        match self.property("reg") {
            Some(&Property::Reg(bytes)) => Some(bytes),
            _ => None,
        }
    }

    pub(crate) fn interrupts_extended_bytes(&self) -> Option<&'blob [u8]> {
        match self.property("interrupts-extended") {
            Some(&Property::InterruptsExtended(bytes)) => Some(bytes),
            _ => None,
        }
    }
}
