//! Signature-based root locators
//!
//! Each signature matches code that loads a global holding the root stash
//! table of one export kind. Signatures are tried most-recent-build first
//! and the first hit wins; with cross-checking every signature runs and
//! all hits must agree.

use super::ExportError;
use crate::memory::binary::ModuleInfo;
use crate::memory::pattern::{scan_range, Pattern};
use crate::memory::source::MemorySource;

/// How to turn a pattern match into the address of the root global
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolve {
    /// `insn + insn_end + disp32`, with the displacement at `disp_offset`
    RipRelative { disp_offset: usize, insn_end: usize },
    /// 32-bit absolute address stored at `offset`
    Absolute32 { offset: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct Signature {
    /// Client build the pattern was taken from
    pub build: &'static str,
    pub pattern: &'static str,
    pub resolve: Resolve,
}

/// Outcome of a locator search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Located {
    Found {
        /// Address of the global holding the root pointer
        global: usize,
        build: &'static str,
    },
    Missed,
}

pub struct Locator<'a> {
    source: &'a dyn MemorySource,
    module: &'a ModuleInfo,
    block_size: usize,
}

impl<'a> Locator<'a> {
    pub fn new(source: &'a dyn MemorySource, module: &'a ModuleInfo, block_size: usize) -> Self {
        Self {
            source,
            module,
            block_size,
        }
    }

    /// Try `signatures` in order and resolve the first hit
    pub fn locate(
        &self,
        what: &str,
        signatures: &[Signature],
        cross_check: bool,
    ) -> Result<Located, ExportError> {
        let mut found: Option<(usize, &'static str)> = None;

        for signature in signatures {
            let Some(global) = self.try_signature(signature)? else {
                tracing::debug!(what, build = signature.build, "signature missed");
                continue;
            };
            tracing::debug!(
                what,
                build = signature.build,
                global = format_args!("{:#x}", global),
                "signature matched"
            );

            match found {
                None => found = Some((global, signature.build)),
                Some((first, first_build)) if first != global => {
                    return Err(ExportError::Consistency(format!(
                        "{} locators disagree: {} -> {:#x}, {} -> {:#x}",
                        what, first_build, first, signature.build, global
                    )));
                }
                Some(_) => {}
            }

            if !cross_check {
                break;
            }
        }

        Ok(match found {
            Some((global, build)) => Located::Found { global, build },
            None => Located::Missed,
        })
    }

    fn try_signature(&self, signature: &Signature) -> Result<Option<usize>, ExportError> {
        let pattern = Pattern::parse(signature.pattern)?;
        let Some(hit) = scan_range(
            self.source,
            self.module.base,
            self.module.size,
            &pattern,
            self.block_size,
        )?
        else {
            return Ok(None);
        };

        let global = match signature.resolve {
            Resolve::RipRelative {
                disp_offset,
                insn_end,
            } => {
                let disp = self.source.read_i32(hit + disp_offset)?;
                (hit + insn_end).wrapping_add_signed(disp as isize)
            }
            Resolve::Absolute32 { offset } => self.source.read_u32(hit + offset)? as usize,
        };
        Ok(Some(global))
    }
}
