// a word of RAM (table entries and user data share this type)
pub type Word = i32;

// number of bits in a word
pub const WORD_WIDTH: u32 = Word::BITS;

// default widths (16-word pages, 64 frames, 4 table levels)
pub const OFFSET_WIDTH: u32 = 4;
pub const PHYSICAL_ADDRESS_WIDTH: u32 = 10;
pub const VIRTUAL_ADDRESS_WIDTH: u32 = 20;

// small widths used for hand-traced scenarios (2-word pages, 8 frames, 4 table levels)
pub const TEST_OFFSET_WIDTH: u32 = 1;
pub const TEST_PHYSICAL_ADDRESS_WIDTH: u32 = 4;
pub const TEST_VIRTUAL_ADDRESS_WIDTH: u32 = 5;

// RAM is a real Vec, keep it within a sane size
pub const MAX_PHYSICAL_ADDRESS_WIDTH: u32 = 30;
pub const MAX_VIRTUAL_ADDRESS_WIDTH: u32 = 63;

// table entry value meaning "no child"
pub const UNLINKED: Word = 0;

// the root table always lives here
pub const ROOT_FRAME: usize = 0;
