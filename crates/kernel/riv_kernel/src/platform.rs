//! Always-run platform module: reports what the device tree says the
//! machine is and arms the tick source from `timebase-frequency`.

use riv_fdt::DeviceTree;

use crate::{KernelError, interrupt::timer, println};

pub fn init(dt: &DeviceTree) -> Result<(), KernelError> {
    if let Some(model) = dt.root().model() {
        println!("machine: {model}");
    }

    let timebase = dt
        .find_by_path("/cpus")
        .and_then(|id| dt.node(id).timebase_frequency())
        .ok_or(KernelError::MissingProperty("timebase-frequency"))?;
    println!("timebase: {timebase} Hz");
    timer::init(timebase);
    Ok(())
}
