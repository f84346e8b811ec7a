//! Indexed RAM bundle encoder (spec.md §4.8 "Indexed RAM bundle", byte
//! layout in §6). A fixed 12-byte preface, a `2·N` `uint32` offset/length
//! table (one pair per module id `0..N`), the startup segment, then the
//! concatenated, NUL-terminated module code.
//!
//! Note on spec.md §8 S5: the worked byte example there (`header_size_bytes
//! = 0x18` alongside three listed table pairs) is internally inconsistent
//! with the canonical field formula given earlier in §6
//! (`header_size_bytes = 8 + 8*N`, which implies only two pairs for
//! `0x18 = 24`). This encoder follows the §6 field table — the
//! unambiguous, machine-readable source — over the prose example; see
//! DESIGN.md.

use super::{collect_modules, SerializableModule};
use crate::core::models::{Graph, ModuleType};
use crate::id_allocator::IdAllocator;
use crate::utils::Result;
use std::collections::HashMap;

pub const MAGIC: u32 = 0xFB0B_D1E5;

/// Produces the binary exactly as laid out in spec.md §6. Physical module
/// code is written in ascending module-id order; only the table's logical
/// offsets are part of the contract, so this choice is free but must stay
/// fixed for determinism (spec.md §8 property 5).
pub fn serialize(graph: &Graph, allocator: &IdAllocator) -> Result<Vec<u8>> {
    let modules = collect_modules(graph, allocator)?;

    let mut startup = String::new();
    let mut by_id: HashMap<u32, &SerializableModule> = HashMap::new();
    for module in &modules {
        match module.module_type {
            ModuleType::Script | ModuleType::RequireCall => {
                if !startup.is_empty() {
                    startup.push('\n');
                }
                startup.push_str(&module.code);
            }
            ModuleType::Module => {
                by_id.insert(module.id, module);
            }
            ModuleType::Asset | ModuleType::Comment => unreachable!("filtered by collect_modules"),
        }
    }

    let n = allocator.table_size();
    let header_bytes: u32 = 8 + 8 * n;
    let startup_bytes = nul_terminated(&startup);

    let code_base = 12usize + 8 * n as usize + startup_bytes.len();
    let mut table = Vec::with_capacity(8 * n as usize);
    let mut code_section = Vec::new();
    let mut cursor = code_base;

    for id in 0..n {
        match by_id.get(&id) {
            Some(module) => {
                let bytes = nul_terminated(&module.code);
                let offset = cursor as u32;
                let length = (bytes.len() - 1) as u32;
                table.extend_from_slice(&offset.to_le_bytes());
                table.extend_from_slice(&length.to_le_bytes());
                cursor += bytes.len();
                code_section.extend_from_slice(&bytes);
            }
            None => {
                table.extend_from_slice(&0u32.to_le_bytes());
                table.extend_from_slice(&0u32.to_le_bytes());
            }
        }
    }

    let mut out = Vec::with_capacity(code_base + code_section.len());
    out.extend_from_slice(&MAGIC.to_le_bytes());
    out.extend_from_slice(&header_bytes.to_le_bytes());
    out.extend_from_slice(&(startup_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&table);
    out.extend_from_slice(&startup_bytes);
    out.extend_from_slice(&code_section);
    Ok(out)
}

fn nul_terminated(s: &str) -> Vec<u8> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    bytes
}

/// Reads back one entry's `(offset, length)` pair from a table built by
/// [`serialize`] — used by round-trip tests (spec.md §8 property 6).
pub fn read_entry(bytes: &[u8], id: u32) -> (u32, u32) {
    let base = 12 + 8 * id as usize;
    let offset = u32::from_le_bytes(bytes[base..base + 4].try_into().unwrap());
    let length = u32::from_le_bytes(bytes[base + 4..base + 8].try_into().unwrap());
    (offset, length)
}
