//! Device-tree binding for the serial console.
//!
//! Programming the ns16550a is the console backend's business and lives
//! out of this tree; binding the device is ours. The driver resolves the
//! node's MMIO window and interrupt source, routes the interrupt through
//! the controller facade, and publishes the result for the backend to
//! claim (it then registers itself via [`super::add_backend`] and takes
//! over the interrupt with `interrupt::set_source_handler`).

use riv_fdt::{DeviceTree, NodeId};

use crate::{KernelError, interrupt, println, sync::BootCell};

/// Everything the external backend needs to attach.
#[derive(Debug)]
pub struct UartBinding {
    pub mmio_base: usize,
    pub mmio_size: usize,
    pub irq: Option<u32>,
}

static BINDING: BootCell<UartBinding> = BootCell::new();

#[must_use]
pub fn binding() -> Option<&'static UartBinding> {
    BINDING.try_get()
}

/// Parked on the UART source until the backend installs its rx path.
fn discard_interrupt(_irq: u32) {}

pub fn init_driver(dt: &DeviceTree, node_id: NodeId) -> Result<(), KernelError> {
    let reg = dt
        .reg(node_id)?
        .next()
        .ok_or(KernelError::MissingProperty("reg"))?;
    let irq = dt
        .first_interrupt(node_id)
        .and_then(|specifier| u32::try_from(specifier).ok());

    // interrupt controllers bind in the early pass, so the facade is live
    if let Some(irq) = irq {
        interrupt::set_source_priority(irq, 1)?;
        interrupt::set_source_handler(irq, discard_interrupt)?;
        interrupt::enable_source(irq)?;
    }

    let binding = UartBinding {
        mmio_base: usize::try_from(reg.addr).unwrap(),
        mmio_size: usize::try_from(reg.size).unwrap(),
        irq,
    };
    println!("uart at {:#x}, irq {:?}", binding.mmio_base, binding.irq);
    BINDING.set(binding);
    Ok(())
}
