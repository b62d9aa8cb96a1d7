//! Compile-time module registry.
//!
//! A static table maps driver `compatible` strings to init hooks. At boot
//! the always-run entries fire first, then every device-tree node is
//! matched against the table in two passes: interrupt controllers before
//! all other devices, so drivers binding afterwards can route their
//! interrupts. The first matching entry is instantiated exactly once per
//! node.

use riv_fdt::{DeviceTree, NodeId};

use crate::{KernelError, console, interrupt::plic, platform, println};

pub enum ModuleKind {
    /// Runs once, unconditionally.
    AlwaysRun(fn(&DeviceTree) -> Result<(), KernelError>),
    /// Runs once per device-tree node carrying a matching `compatible`.
    Driver {
        compatible: &'static [&'static str],
        init: fn(&DeviceTree, NodeId) -> Result<(), KernelError>,
    },
}

pub struct Module {
    pub name: &'static str,
    pub enabled: bool,
    pub kind: ModuleKind,
}

/// Everything the kernel knows how to drive. The ns16550a entry only
/// binds the device and routes its interrupt; the register-level console
/// backend is external and attaches through `console::add_backend`.
pub static MODULES: &[Module] = &[
    Module {
        name: "platform",
        enabled: true,
        kind: ModuleKind::AlwaysRun(platform::init),
    },
    Module {
        name: "plic",
        enabled: true,
        kind: ModuleKind::Driver {
            compatible: &["riscv,plic0", "sifive,plic-1.0.0"],
            init: plic::init_driver,
        },
    },
    Module {
        name: "ns16550a",
        enabled: true,
        kind: ModuleKind::Driver {
            compatible: &["ns16550a"],
            init: console::uart::init_driver,
        },
    },
];

/// Runs always-run modules, then binds drivers to device-tree nodes.
pub fn bind(dt: &DeviceTree, modules: &[Module]) -> Result<(), KernelError> {
    for module in modules.iter().filter(|m| m.enabled) {
        if let ModuleKind::AlwaysRun(init) = module.kind {
            init(dt)?;
        }
    }

    for controller_pass in [true, false] {
        for id in dt.nodes() {
            let node = dt.node(id);
            if node.is_interrupt_controller() != controller_pass {
                continue;
            }
            if !node.status_okay() {
                continue;
            }
            bind_node(dt, id, modules)?;
        }
    }
    Ok(())
}

fn bind_node(dt: &DeviceTree, id: NodeId, modules: &[Module]) -> Result<(), KernelError> {
    let node = dt.node(id);
    for module in modules.iter().filter(|m| m.enabled) {
        let ModuleKind::Driver { compatible, init } = &module.kind else {
            continue;
        };
        if node.compatible().any(|c| compatible.contains(&c)) {
            println!("module {}: binding {}", module.name, node.name());
            return init(dt, id);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Just enough of a blob builder for registry fixtures.
    struct TreeBuilder {
        structure: Vec<u8>,
        strings: Vec<u8>,
    }

    impl TreeBuilder {
        fn new() -> Self {
            Self {
                structure: Vec::new(),
                strings: Vec::new(),
            }
        }

        fn token(&mut self, token: u32) -> &mut Self {
            self.structure.extend_from_slice(&token.to_be_bytes());
            self
        }

        fn begin(&mut self, name: &str) -> &mut Self {
            self.token(1);
            self.structure.extend_from_slice(name.as_bytes());
            self.structure.push(0);
            while self.structure.len() % 4 != 0 {
                self.structure.push(0);
            }
            self
        }

        fn end(&mut self) -> &mut Self {
            self.token(2)
        }

        fn prop(&mut self, name: &str, value: &[u8]) -> &mut Self {
            let name_off = self.strings.len() as u32;
            self.strings.extend_from_slice(name.as_bytes());
            self.strings.push(0);
            self.token(3);
            self.structure
                .extend_from_slice(&(value.len() as u32).to_be_bytes());
            self.structure.extend_from_slice(&name_off.to_be_bytes());
            self.structure.extend_from_slice(value);
            while self.structure.len() % 4 != 0 {
                self.structure.push(0);
            }
            self
        }

        fn finish(&mut self) -> Vec<u8> {
            self.token(9);
            let off_struct = 40 + 16;
            let off_strings = off_struct + self.structure.len();
            let total = off_strings + self.strings.len();

            let mut blob = Vec::new();
            for word in [
                0xD00D_FEEDu32,
                total as u32,
                off_struct as u32,
                off_strings as u32,
                40,
                17,
                16,
                0,
                self.strings.len() as u32,
                self.structure.len() as u32,
            ] {
                blob.extend_from_slice(&word.to_be_bytes());
            }
            blob.extend_from_slice(&[0; 16]);
            blob.extend_from_slice(&self.structure);
            blob.extend_from_slice(&self.strings);
            blob
        }
    }

    fn fixture_blob() -> Vec<u8> {
        let mut b = TreeBuilder::new();
        b.begin("");
        b.begin("uart@10000000");
        b.prop("compatible", b"ns16550a\0");
        b.end();
        b.begin("plic@c000000");
        b.prop("compatible", b"sifive,plic-1.0.0\0riscv,plic0\0");
        b.prop("interrupt-controller", &[]);
        b.end();
        b.begin("ghost@0");
        b.prop("compatible", b"ns16550a\0");
        b.prop("status", b"disabled\0");
        b.end();
        b.end();
        b.finish()
    }

    static BOUND: Mutex<Vec<String>> = Mutex::new(Vec::new());

    fn record_always(_dt: &DeviceTree) -> Result<(), KernelError> {
        BOUND.lock().unwrap().push("always".into());
        Ok(())
    }

    fn record_intc(dt: &DeviceTree, id: NodeId) -> Result<(), KernelError> {
        BOUND.lock().unwrap().push(dt.node(id).name().into());
        Ok(())
    }

    fn record_uart(dt: &DeviceTree, id: NodeId) -> Result<(), KernelError> {
        BOUND.lock().unwrap().push(dt.node(id).name().into());
        Ok(())
    }

    fn never(_dt: &DeviceTree, _id: NodeId) -> Result<(), KernelError> {
        panic!("disabled module must not bind");
    }

    #[test]
    fn binds_controllers_first_and_skips_disabled() {
        let blob = fixture_blob();
        let dt = DeviceTree::parse(&blob).unwrap();

        let modules = [
            Module {
                name: "boot-report",
                enabled: true,
                kind: ModuleKind::AlwaysRun(record_always),
            },
            Module {
                name: "serial",
                enabled: true,
                kind: ModuleKind::Driver {
                    compatible: &["ns16550a"],
                    init: record_uart,
                },
            },
            Module {
                name: "intc",
                enabled: true,
                kind: ModuleKind::Driver {
                    compatible: &["riscv,plic0"],
                    init: record_intc,
                },
            },
            Module {
                name: "ghost-driver",
                enabled: false,
                kind: ModuleKind::Driver {
                    compatible: &["ns16550a"],
                    init: never,
                },
            },
        ];

        BOUND.lock().unwrap().clear();
        bind(&dt, &modules).unwrap();

        // always-run first, then the interrupt controller, then the uart;
        // the status=disabled node binds nothing
        assert_eq!(
            *BOUND.lock().unwrap(),
            ["always", "plic@c000000", "uart@10000000"]
        );
    }

    #[test]
    fn first_matching_module_wins() {
        let blob = fixture_blob();
        let dt = DeviceTree::parse(&blob).unwrap();

        static FIRST: Mutex<u32> = Mutex::new(0);
        fn count_first(_dt: &DeviceTree, _id: NodeId) -> Result<(), KernelError> {
            *FIRST.lock().unwrap() += 1;
            Ok(())
        }
        fn shadowed(_dt: &DeviceTree, _id: NodeId) -> Result<(), KernelError> {
            panic!("second matching module must not bind");
        }

        let modules = [
            Module {
                name: "serial",
                enabled: true,
                kind: ModuleKind::Driver {
                    compatible: &["ns16550a"],
                    init: count_first,
                },
            },
            Module {
                name: "serial-alt",
                enabled: true,
                kind: ModuleKind::Driver {
                    compatible: &["ns16550a"],
                    init: shadowed,
                },
            },
        ];

        bind(&dt, &modules).unwrap();
        assert_eq!(*FIRST.lock().unwrap(), 1);
    }
}
