//! MPEG-TS PSI section parsing for the conditional-access path.
//!
//! Sections arrive already reassembled (for example from a capture file);
//! this module decodes the PMT and CAT and the CA descriptors they carry.
//!
//! # Supported Tables
//! - CAT (Conditional Access Table) - PID 0x0001
//! - PMT (Program Map Table) - PID announced in the PAT
//!
//! # Usage
//! ```ignore
//! use tvcard::ts_analyzer::{CaDescriptor, PmtTable, PsiSection};
//!
//! let section = PsiSection::parse(&raw)?;
//! let pmt = PmtTable::parse(&section)?;
//! for descriptor in pmt.program_ca_descriptors() {
//!     let cad = CaDescriptor::decode(descriptor)?;
//!     println!("CA system 0x{:04x}", cad.ca_system_id);
//! }
//! ```

mod cat;
mod descriptors;
mod pmt;
mod psi;

pub use cat::CatTable;
pub use descriptors::{parse_descriptor_loop, CaDescriptor, Descriptor};
pub use pmt::{PmtStream, PmtTable};
pub use psi::{crc32_mpeg2, PsiHeader, PsiSection};

/// Table IDs of the sections parsed here.
pub mod table_id {
    /// Conditional Access Section.
    pub const CAT: u8 = 0x01;
    /// Program Map Section.
    pub const PMT: u8 = 0x02;
}

/// Descriptor tags that identify elementary stream content.
pub mod descriptor_tag {
    /// Video stream descriptor.
    pub const VIDEO_STREAM: u8 = 0x02;
    /// Audio stream descriptor.
    pub const AUDIO_STREAM: u8 = 0x03;
    /// Conditional access descriptor.
    pub const CONDITIONAL_ACCESS: u8 = 0x09;
    /// MPEG-4 video descriptor.
    pub const MPEG4_VIDEO: u8 = 0x1B;
    /// MPEG-4 audio descriptor.
    pub const MPEG4_AUDIO: u8 = 0x1C;
    /// AVC video descriptor.
    pub const AVC_VIDEO: u8 = 0x28;
    /// MPEG-2 AAC audio descriptor.
    pub const MPEG2_AAC_AUDIO: u8 = 0x2B;
    /// VBI teletext descriptor (DVB).
    pub const VBI_TELETEXT: u8 = 0x46;
    /// Teletext descriptor (DVB).
    pub const TELETEXT: u8 = 0x56;
    /// AC-3 descriptor (DVB).
    pub const AC3: u8 = 0x6A;
    /// Enhanced AC-3 descriptor (DVB).
    pub const ENHANCED_AC3: u8 = 0x7A;
    /// AAC descriptor (DVB).
    pub const AAC: u8 = 0x7C;
    /// AC-3 audio descriptor (ATSC).
    pub const AC3_AUDIO: u8 = 0x81;

    /// Returns true for tags that say what kind of stream they describe.
    ///
    /// The first such descriptor in an ES info loop is the stream's
    /// primary descriptor.
    pub fn identifies_stream(tag: u8) -> bool {
        matches!(
            tag,
            VIDEO_STREAM
                | AUDIO_STREAM
                | MPEG4_VIDEO
                | MPEG4_AUDIO
                | AVC_VIDEO
                | MPEG2_AAC_AUDIO
                | VBI_TELETEXT
                | TELETEXT
                | AC3
                | ENHANCED_AC3
                | AAC
                | AC3_AUDIO
        )
    }
}

/// Stream type constants.
pub mod stream_type {
    /// MPEG-1 Part 2 video.
    pub const MPEG1_VIDEO: u8 = 0x01;
    /// MPEG-2 Part 2 video.
    pub const MPEG2_VIDEO: u8 = 0x02;
    /// MPEG-1 Part 3 audio.
    pub const MPEG1_AUDIO: u8 = 0x03;
    /// MPEG-2 Part 3 audio.
    pub const MPEG2_AUDIO: u8 = 0x04;
    /// MPEG-2 PES private data.
    pub const PES_PRIVATE_DATA: u8 = 0x06;
    /// MPEG-2 Part 7 audio (AAC ADTS).
    pub const MPEG2_AAC_AUDIO: u8 = 0x0F;
    /// MPEG-4 Part 2 video.
    pub const MPEG4_VIDEO: u8 = 0x10;
    /// MPEG-4 Part 3 audio (AAC LATM).
    pub const MPEG4_AUDIO: u8 = 0x11;
    /// MPEG-4 Part 10 video (H.264/AVC).
    pub const H264_VIDEO: u8 = 0x1B;
    /// AC-3 audio.
    pub const AC3_AUDIO: u8 = 0x81;
    /// Enhanced AC-3 audio.
    pub const ENHANCED_AC3_AUDIO: u8 = 0x87;
}
