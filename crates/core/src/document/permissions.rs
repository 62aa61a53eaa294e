//! User access permissions from the encryption dictionary's `/P` entry.

use bitflags::bitflags;

bitflags! {
    /// Permission bits granted to a user-password holder.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u32 {
        /// Print the document (bit 3)
        const PRINT = 1 << 2;
        /// Modify contents other than annotations and forms (bit 4)
        const MODIFY = 1 << 3;
        /// Copy or extract text and graphics (bit 5)
        const COPY = 1 << 4;
        /// Add or modify annotations, fill forms (bit 6)
        const ANNOTATE = 1 << 5;
        /// Fill in existing form fields (bit 9)
        const FILL_FORMS = 1 << 8;
        /// Extract text and graphics for accessibility (bit 10)
        const EXTRACT_FOR_ACCESSIBILITY = 1 << 9;
        /// Insert, rotate or delete pages (bit 11)
        const ASSEMBLE = 1 << 10;
        /// Print at full resolution (bit 12)
        const PRINT_HIGH_QUALITY = 1 << 11;
    }
}

impl Permissions {
    /// Decode a signed `/P` value; reserved bits are dropped.
    pub const fn from_p(p: i32) -> Self {
        Self::from_bits_truncate(p as u32)
    }

    /// Encode as a `/P` value with the reserved bits set as writers must.
    pub const fn to_p(self) -> i32 {
        // Bits 7-8 and 13-32 are reserved and must be 1.
        const RESERVED: u32 = 0xFFFF_F0C0;
        (self.bits() | RESERVED) as i32
    }
}
