// Opcode classification for field event scripts.
//
// Every opcode falls into exactly one class. Most have a fixed operand
// length; SPCAL picks a descriptor from a second table via its first operand
// byte, and KAWAI stores the total instruction size (opcode byte included)
// in its first operand byte.

/// Named opcodes used by the flow analysis and the text tooling.
pub mod op {
    pub const RET: u8 = 0x00;
    pub const RETTO: u8 = 0x07;
    pub const SPCAL: u8 = 0x0F;
    pub const SKIP: u8 = 0x10;
    pub const LSKIP: u8 = 0x11;
    pub const BACK: u8 = 0x12;
    pub const LBACK: u8 = 0x13;
    pub const IF: u8 = 0x14;
    pub const LIF: u8 = 0x15;
    pub const IF2: u8 = 0x16;
    pub const LIF2: u8 = 0x17;
    pub const IF2U: u8 = 0x18;
    pub const LIF2U: u8 = 0x19;
    pub const KAWAI: u8 = 0x28;
    pub const WSIZW: u8 = 0x2F;
    pub const KEYQ: u8 = 0x30;
    pub const KEYON: u8 = 0x31;
    pub const KEYOFF: u8 = 0x32;
    pub const WSPCL: u8 = 0x36;
    pub const MES: u8 = 0x40;
    pub const MPNAM: u8 = 0x43;
    pub const ASK: u8 = 0x48;
    pub const WSIZE: u8 = 0x50;
    pub const WREST: u8 = 0x53;
    /// Mnemonic "wait"; takes no operands and is used for padding.
    pub const NOP: u8 = 0x5F;
    pub const PRTYQ: u8 = 0xCB;
    pub const MEMBQ: u8 = 0xCC;
    pub const GMOVR: u8 = 0xFF;

    /// SPCAL sub-opcode SPCNM, as a filter key (`0x0F00 | sub`).
    pub const SPCNM: u16 = 0x0FFD;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Fixed { mnemonic: &'static str, operands: u8 },
    /// SPCAL: the first operand byte is a sub-opcode, see [`special_opcode`].
    Special,
    /// KAWAI: the first operand byte is the total instruction size.
    SelfSized { mnemonic: &'static str },
    Illegal,
}

impl Opcode {
    pub fn mnemonic(&self) -> Option<&'static str> {
        match self {
            Opcode::Fixed { mnemonic, .. } | Opcode::SelfSized { mnemonic } => Some(mnemonic),
            Opcode::Special => Some("spcal"),
            Opcode::Illegal => None,
        }
    }
}

const fn fixed(mnemonic: &'static str, operands: u8) -> Opcode {
    Opcode::Fixed { mnemonic, operands }
}

/// Classify a primary opcode byte.
pub const fn opcode(op: u8) -> Opcode {
    match op {
        0x00 => fixed("ret", 0),
        0x01 => fixed("req", 2),
        0x02 => fixed("reqsw", 2),
        0x03 => fixed("reqew", 2),
        0x04 => fixed("preq", 2),
        0x05 => fixed("prqsw", 2),
        0x06 => fixed("prqew", 2),
        0x07 => fixed("retto", 1),
        0x08 => fixed("join", 1),
        0x09 => fixed("split", 14),
        0x0A => fixed("sptye", 5),
        0x0B => fixed("gptye", 5),
        0x0E => fixed("dskcg", 1),
        0x0F => Opcode::Special,

        0x10 => fixed("skip", 1),
        0x11 => fixed("lskip", 2),
        0x12 => fixed("back", 1),
        0x13 => fixed("lback", 2),
        0x14 => fixed("if", 5),
        0x15 => fixed("lif", 6),
        0x16 => fixed("if2", 7),
        0x17 => fixed("lif2", 8),
        0x18 => fixed("if2", 7),
        0x19 => fixed("lif2", 8),

        0x20 => fixed("mgame", 10),
        0x21 => fixed("tutor", 1),
        0x22 => fixed("btmd2", 4),
        0x23 => fixed("btrlt", 2),
        0x24 => fixed("wait", 2),
        0x25 => fixed("nfade", 8),
        0x26 => fixed("blink", 1),
        0x27 => fixed("bgmovie", 1),
        0x28 => Opcode::SelfSized { mnemonic: "kawai" },
        0x29 => fixed("kawiw", 0),
        0x2A => fixed("pmova", 1),
        0x2B => fixed("slip", 1),
        0x2C => fixed("bgdph", 4),
        0x2D => fixed("bgscr", 6),
        0x2E => fixed("wcls!", 1),
        0x2F => fixed("wsizw", 9),

        0x30 => fixed("key!", 3),
        0x31 => fixed("keyon", 3),
        0x32 => fixed("keyof", 3),
        0x33 => fixed("uc", 1),
        0x34 => fixed("pdira", 1),
        0x35 => fixed("ptura", 3),
        0x36 => fixed("wspcl", 4),
        0x37 => fixed("wnumb", 7),
        0x38 => fixed("sttim", 5),
        0x39 => fixed("gold+", 5),
        0x3A => fixed("gold-", 5),
        0x3B => fixed("chgld", 3),
        0x3C => fixed("hmpmx", 0),
        0x3D => fixed("hmpmx", 0),
        0x3E => fixed("mhmmx", 0),
        0x3F => fixed("hmpmx", 0),

        0x40 => fixed("mes", 2),
        0x41 => fixed("mpara", 4),
        0x42 => fixed("mpra2", 5),
        0x43 => fixed("mpnam", 1),
        0x45 => fixed("mp+", 4),
        0x47 => fixed("mp-", 4),
        0x48 => fixed("ask", 6),
        0x49 => fixed("menu", 3),
        0x4A => fixed("menu", 1),
        0x4B => fixed("btltb", 1),
        0x4D => fixed("hp+", 4),
        0x4F => fixed("hp-", 4),

        0x50 => fixed("wsize", 9),
        0x51 => fixed("wmove", 5),
        0x52 => fixed("wmode", 3),
        0x53 => fixed("wrest", 1),
        0x54 => fixed("wclse", 1),
        0x55 => fixed("wrow", 2),
        0x56 => fixed("gwcol", 6),
        0x57 => fixed("swcol", 6),
        0x58 => fixed("stitm", 4),
        0x59 => fixed("dlitm", 4),
        0x5A => fixed("ckitm", 4),
        0x5B => fixed("smtra", 6),
        0x5C => fixed("dmtra", 7),
        0x5D => fixed("cmtra", 9),
        0x5E => fixed("shake", 7),
        0x5F => fixed("wait", 0),

        0x60 => fixed("mjump", 9),
        0x61 => fixed("scrlo", 1),
        0x62 => fixed("scrlc", 4),
        0x63 => fixed("scrla", 5),
        0x64 => fixed("scr2d", 5),
        0x65 => fixed("scrcc", 0),
        0x66 => fixed("scr2dc", 8),
        0x67 => fixed("scrlw", 0),
        0x68 => fixed("scr2dl", 8),
        0x69 => fixed("mpdsp", 1),
        0x6A => fixed("vwoft", 6),
        0x6B => fixed("fade", 8),
        0x6C => fixed("fadew", 0),
        0x6D => fixed("idlck", 3),
        0x6E => fixed("lstmp", 2),
        0x6F => fixed("scrlp", 5),

        0x70 => fixed("batle", 3),
        0x71 => fixed("btlon", 1),
        0x72 => fixed("btlmd", 2),
        0x73 => fixed("pgtdr", 3),
        0x74 => fixed("getpc", 3),
        0x75 => fixed("pxyzi", 7),
        0x76 => fixed("plus!", 3),
        0x77 => fixed("pls2!", 4),
        0x78 => fixed("mins!", 3),
        0x79 => fixed("mns2!", 4),
        0x7A => fixed("inc!", 2),
        0x7B => fixed("inc2!", 2),
        0x7C => fixed("dec!", 2),
        0x7D => fixed("dec2!", 2),
        0x7E => fixed("tlkon", 1),
        0x7F => fixed("rdmsd", 2),

        0x80 => fixed("set", 3),
        0x81 => fixed("set2", 4),
        0x82 => fixed("biton", 3),
        0x83 => fixed("bitof", 3),
        0x84 => fixed("bitxr", 3),
        0x85 => fixed("plus", 3),
        0x86 => fixed("plus2", 4),
        0x87 => fixed("minus", 3),
        0x88 => fixed("mins2", 4),
        0x89 => fixed("mul", 3),
        0x8A => fixed("mul2", 4),
        0x8B => fixed("div", 3),
        0x8C => fixed("div2", 4),
        0x8D => fixed("remai", 3),
        0x8E => fixed("rema2", 4),
        0x8F => fixed("and", 3),

        0x90 => fixed("and2", 4),
        0x91 => fixed("or", 3),
        0x92 => fixed("or2", 4),
        0x93 => fixed("xor", 3),
        0x94 => fixed("xor2", 4),
        0x95 => fixed("inc", 2),
        0x96 => fixed("inc2", 2),
        0x97 => fixed("dec", 2),
        0x98 => fixed("dec2", 2),
        0x99 => fixed("randm", 2),
        0x9A => fixed("lbyte", 3),
        0x9B => fixed("hbyte", 4),
        0x9C => fixed("2byte", 5),
        0x9D => fixed("setx", 6),
        0x9E => fixed("getx", 6),
        0x9F => fixed("srchx", 10),

        0xA0 => fixed("pc", 1),
        0xA1 => fixed("char", 1),
        0xA2 => fixed("dfanm", 2),
        0xA3 => fixed("anime", 2),
        0xA4 => fixed("visi", 1),
        0xA5 => fixed("xyzi", 10),
        0xA6 => fixed("xyi", 8),
        0xA7 => fixed("xyz", 8),
        0xA8 => fixed("move", 5),
        0xA9 => fixed("cmove", 5),
        0xAA => fixed("mova", 1),
        0xAB => fixed("tura", 3),
        0xAC => fixed("animw", 0),
        0xAD => fixed("fmove", 5),
        0xAE => fixed("anime", 2),
        0xAF => fixed("anim!", 2),

        0xB0 => fixed("canim", 4),
        0xB1 => fixed("canm!", 4),
        0xB2 => fixed("msped", 3),
        0xB3 => fixed("dir", 2),
        0xB4 => fixed("turnr", 5),
        0xB5 => fixed("turn", 5),
        0xB6 => fixed("dira", 1),
        0xB7 => fixed("gtdir", 3),
        0xB8 => fixed("getaxy", 4),
        0xB9 => fixed("getai", 3),
        0xBA => fixed("anim!", 2),
        0xBB => fixed("canim", 4),
        0xBC => fixed("canm!", 4),
        0xBD => fixed("asped", 3),
        0xBF => fixed("cc", 1),

        0xC0 => fixed("jump", 10),
        0xC1 => fixed("axyzi", 7),
        0xC2 => fixed("lader", 14),
        0xC3 => fixed("ofstd", 11),
        0xC4 => fixed("ofstw", 0),
        0xC5 => fixed("talkR", 2),
        0xC6 => fixed("slidR", 2),
        0xC7 => fixed("solid", 1),
        0xC8 => fixed("prtyp", 1),
        0xC9 => fixed("prtym", 1),
        0xCA => fixed("prtye", 3),
        0xCB => fixed("prtyq", 2),
        0xCC => fixed("membq", 2),
        0xCD => fixed("mmb+-", 2),
        0xCE => fixed("mmblk", 1),
        0xCF => fixed("mmbuk", 1),

        0xD0 => fixed("line", 12),
        0xD1 => fixed("linon", 1),
        0xD2 => fixed("mpjpo", 1),
        0xD3 => fixed("sline", 15),
        0xD4 => fixed("sin", 9),
        0xD5 => fixed("cos", 9),
        0xD6 => fixed("tlkR2", 3),
        0xD7 => fixed("sldR2", 3),
        0xD8 => fixed("pmjmp", 2),
        0xD9 => fixed("pmjmp", 0),
        0xDA => fixed("akao2", 14),
        0xDB => fixed("fcfix", 1),
        0xDC => fixed("ccanm", 3),
        0xDD => fixed("animb", 0),
        0xDE => fixed("turnw", 0),
        0xDF => fixed("mppal", 10),

        0xE0 => fixed("bgon", 3),
        0xE1 => fixed("bgoff", 3),
        0xE2 => fixed("bgrol", 2),
        0xE3 => fixed("bgrol", 2),
        0xE4 => fixed("bgclr", 2),
        0xE5 => fixed("stpal", 4),
        0xE6 => fixed("ldpal", 4),
        0xE7 => fixed("cppal", 4),
        0xE8 => fixed("rtpal", 6),
        0xE9 => fixed("adpal", 9),
        0xEA => fixed("mppal", 9),
        0xEB => fixed("stpls", 4),
        0xEC => fixed("ldpls", 4),
        0xED => fixed("cppal", 7),
        0xEE => fixed("rtpal", 7),
        0xEF => fixed("adpal", 10),

        0xF0 => fixed("music", 1),
        0xF1 => fixed("se", 4),
        0xF2 => fixed("akao", 13),
        0xF3 => fixed("musvt", 1),
        0xF4 => fixed("musvm", 1),
        0xF5 => fixed("mulck", 1),
        0xF6 => fixed("bmusc", 1),
        0xF7 => fixed("chmph", 3),
        0xF8 => fixed("pmvie", 1),
        0xF9 => fixed("movie", 0),
        0xFA => fixed("mvief", 2),
        0xFB => fixed("mvcam", 1),
        0xFC => fixed("fmusc", 1),
        0xFD => fixed("cmusc", 5),
        0xFE => fixed("chmst", 2),
        0xFF => fixed("gmovr", 0),

        // Unused slots in the engine's dispatch table.
        0x0C | 0x0D | 0x1A..=0x1F | 0x44 | 0x46 | 0x4C | 0x4E | 0xBE => Opcode::Illegal,
    }
}

/// Mnemonic and operand length of an SPCAL sub-opcode (the sub-opcode byte
/// itself is not counted).
pub const fn special_opcode(sub: u8) -> Option<(&'static str, u8)> {
    match sub {
        0xF5 => Some(("arrow", 1)),
        0xF6 => Some(("pname", 4)),
        0xF7 => Some(("gmspd", 2)),
        0xF8 => Some(("smspd", 2)),
        0xF9 => Some(("flmat", 0)),
        0xFA => Some(("flitm", 0)),
        0xFB => Some(("btlck", 1)),
        0xFC => Some(("mvlck", 1)),
        0xFD => Some(("spcnm", 2)),
        0xFE => Some(("rsglb", 0)),
        0xFF => Some(("clitm", 0)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_opcodes_have_expected_lengths() {
        assert_eq!(opcode(op::RET), Opcode::Fixed { mnemonic: "ret", operands: 0 });
        assert_eq!(opcode(op::SKIP), Opcode::Fixed { mnemonic: "skip", operands: 1 });
        assert_eq!(opcode(op::LIF2U), Opcode::Fixed { mnemonic: "lif2", operands: 8 });
        assert_eq!(opcode(op::MES), Opcode::Fixed { mnemonic: "mes", operands: 2 });
    }

    #[test]
    fn irregular_opcodes_are_tagged() {
        assert_eq!(opcode(op::SPCAL), Opcode::Special);
        assert_eq!(opcode(op::KAWAI), Opcode::SelfSized { mnemonic: "kawai" });
        assert_eq!(opcode(0x1C), Opcode::Illegal);
        assert_eq!(opcode(0xBE).mnemonic(), None);
    }

    #[test]
    fn illegal_slot_count() {
        let illegal = (0..=255u8)
            .filter(|&b| opcode(b) == Opcode::Illegal)
            .count();
        assert_eq!(illegal, 13);
    }

    #[test]
    fn special_table_covers_f5_to_ff() {
        assert_eq!(special_opcode(0xFD), Some(("spcnm", 2)));
        assert_eq!(special_opcode(0xF5), Some(("arrow", 1)));
        assert_eq!(special_opcode(0xF4), None);
        assert_eq!(special_opcode(0x00), None);
    }
}
