//! Known locator signatures, most recent client build first

use super::locator::{Resolve, Signature};

/// `mov rcx, [rip+disp32]`: displacement at 3, instruction ends at 7
const MOV_RCX_RIP: Resolve = Resolve::RipRelative {
    disp_offset: 3,
    insn_end: 7,
};

/// `lea rdx, [rip+disp32]`: displacement at 3, instruction ends at 7
const LEA_RDX_RIP: Resolve = Resolve::RipRelative {
    disp_offset: 3,
    insn_end: 7,
};

/// Root stash of named parse tables
pub static PARSE_TABLE_SIGNATURES: &[Signature] = &[
    Signature {
        build: "2023-x64",
        pattern: "48 8B 0D ?? ?? ?? ?? 4C 8D 44 24 ?? 48 8B D3 E8 ?? ?? ?? ?? 85 C0 74 ?? 48 8B 44 24",
        resolve: MOV_RCX_RIP,
    },
    Signature {
        build: "2019-x64",
        pattern: "48 8B 0D ?? ?? ?? ?? 4C 8D 44 24 ?? 48 8B D7 E8 ?? ?? ?? ?? 85 C0 75 ?? 33 C0",
        resolve: MOV_RCX_RIP,
    },
    Signature {
        build: "2013-x86",
        pattern: "8B 0D ?? ?? ?? ?? 8D 44 24 ?? 50 56 E8 ?? ?? ?? ?? 85 C0 74 ?? 8B 44 24",
        resolve: Resolve::Absolute32 { offset: 2 },
    },
];

/// Root stash of named static define lists
pub static ENUM_SIGNATURES: &[Signature] = &[
    Signature {
        build: "2023-x64",
        pattern: "48 8D 15 ?? ?? ?? ?? 48 8B CB E8 ?? ?? ?? ?? 48 8B 0D ?? ?? ?? ?? 4C 8B C0 48 8B D3",
        resolve: Resolve::RipRelative {
            disp_offset: 18,
            insn_end: 22,
        },
    },
    Signature {
        build: "2019-x64",
        pattern: "48 8B 0D ?? ?? ?? ?? 4C 8B C6 48 8B D5 E8 ?? ?? ?? ?? 84 C0 74 ?? 48 8B 05",
        resolve: MOV_RCX_RIP,
    },
    Signature {
        build: "2013-x86",
        pattern: "A1 ?? ?? ?? ?? 57 56 50 E8 ?? ?? ?? ?? 83 C4 0C 84 C0 74",
        resolve: Resolve::Absolute32 { offset: 1 },
    },
];

/// Root stash of expression functions
pub static EXPR_FUNC_SIGNATURES: &[Signature] = &[
    Signature {
        build: "2023-x64",
        pattern: "48 8D 15 ?? ?? ?? ?? 48 8B CF E8 ?? ?? ?? ?? 48 85 C0 0F 84 ?? ?? ?? ?? 48 8B 48 08",
        resolve: LEA_RDX_RIP,
    },
    Signature {
        build: "2019-x64",
        pattern: "48 8B 0D ?? ?? ?? ?? 48 8B D6 4C 8D 44 24 ?? E8 ?? ?? ?? ?? 85 C0 74 ?? 4C 8B 44 24",
        resolve: MOV_RCX_RIP,
    },
    Signature {
        build: "2013-x86",
        pattern: "8B 15 ?? ?? ?? ?? 8D 4C 24 ?? 51 57 52 E8 ?? ?? ?? ?? 83 C4 0C 85 C0",
        resolve: Resolve::Absolute32 { offset: 2 },
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::pattern::Pattern;

    #[test]
    fn test_catalog_patterns_parse() {
        for signature in PARSE_TABLE_SIGNATURES
            .iter()
            .chain(ENUM_SIGNATURES)
            .chain(EXPR_FUNC_SIGNATURES)
        {
            let pattern = Pattern::parse(signature.pattern).unwrap();
            assert!(pattern.len() > 16, "{} pattern too short", signature.build);

            let end = match signature.resolve {
                Resolve::RipRelative { disp_offset, insn_end } => {
                    assert_eq!(insn_end, disp_offset + 4);
                    insn_end
                }
                Resolve::Absolute32 { offset } => offset + 4,
            };
            assert!(end <= pattern.len());
        }
    }
}
