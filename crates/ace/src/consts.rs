//! Wire-level constants for GlobalPlatform Secure Element Access Control
//!
//! Tag values, application identifiers and command headers as defined by
//! "GlobalPlatform Device Technology - Secure Element Access Control" and by
//! PKCS#15. These must be reproduced bit-exact; the decision and retrieval
//! logic matches against them directly.

/// BER-TLV tags used by the access rule files and data objects
pub mod tags {
    // ASN.1 / PKCS#15 tags used by the file-system rule source
    /// ASN.1 SEQUENCE
    pub const SEQUENCE: u8 = 0x30;
    /// ASN.1 OCTET STRING
    pub const OCTET_STRING: u8 = 0x04;
    /// ASN.1 OBJECT IDENTIFIER
    pub const OID: u8 = 0x06;
    /// File Control Parameters template returned by SELECT
    pub const FCP: u8 = 0x62;
    /// File size (without structural information) inside the FCP template
    pub const FCP_FILE_SIZE: u8 = 0x80;
    /// oidDO entry in the DODF
    pub const EXTERNAL_DO: u8 = 0xA1;
    /// Indirect path reference
    pub const INDIRECT: u8 = 0xA5;
    /// Data object file entry in the ODF
    pub const EF_ODF: u8 = 0xA7;
    /// ACRF entry scoped to a single applet AID (GPD C.1-C.3)
    pub const GPD_AID: u8 = 0xA0;
    /// ACRF entry scoped to all applets on the element (GPD C.1-C.3)
    pub const GPD_ALL: u8 = 0x82;

    // ARA-M data object tags (GPD section 4)
    /// REF-AR-DO, one complete access rule
    pub const REF_AR_DO: u8 = 0xE2;
    /// REF-DO, the (AID, device application) pairing of a rule
    pub const REF_DO: u8 = 0xE1;
    /// AR-DO, the access conditions of a rule
    pub const AR_DO: u8 = 0xE3;
    /// DeviceAppID-REF-DO, certificate hash of the device application
    pub const HASH_REF_DO: u8 = 0xC1;
    /// AID-REF-DO, applet identifier
    pub const AID_REF_DO: u8 = 0x4F;
    /// APDU-AR-DO, APDU access rule (boolean or filter list)
    pub const APDU_AR_DO: u8 = 0xD0;
    /// NFC-AR-DO, NFC event access rule (boolean)
    pub const NFC_AR_DO: u8 = 0xD1;

    /// Padding byte in 0xFF-padded elementary files (GPD 7.1.2)
    pub const PADDING: u8 = 0xFF;
}

/// Application identifiers of the two rule sources
pub mod aid {
    /// PKCS#15 application, entry point of the file-system rule source
    /// (GPD 7.1.3)
    pub const PKCS15: [u8; 12] = [
        0xA0, 0x00, 0x00, 0x00, 0x63, 0x50, 0x4B, 0x43, 0x53, 0x2D, 0x31, 0x35,
    ];

    /// Access Rule Application Master applet
    pub const ARA_M: [u8; 9] = [0xA0, 0x00, 0x00, 0x01, 0x51, 0x41, 0x43, 0x4C, 0x00];
}

/// APDU command headers (CLA, INS, P1, P2) consumed by the retrieval
/// strategies, per ISO 7816-4 and GPD section 4.1
pub mod apdu {
    /// SELECT by DF name, FCP template requested
    pub const SELECT_BY_DF: [u8; 4] = [0x00, 0xA4, 0x00, 0x04];
    /// READ BINARY from offset zero
    pub const READ_BINARY: [u8; 4] = [0x00, 0xB0, 0x00, 0x00];
    /// GET DATA [all], requests the full rule stream from the ARA-M
    pub const GET_ALL_DATA: [u8; 4] = [0x80, 0xCA, 0xFF, 0x40];
    /// GET DATA [next], requests the next fragment of the rule stream
    pub const GET_NEXT_DATA: [u8; 4] = [0x80, 0xCA, 0xFF, 0x60];
    /// GET DATA [refresh tag]
    pub const GET_REFRESH_TAG: [u8; 4] = [0x80, 0xCA, 0xDF, 0x20];
}

/// File identifier of the Object Directory File (PKCS#15)
pub const ODF_PATH: [u8; 2] = [0x50, 0x31];

/// DER encoding of 1.2.840.114283.200.1.1, the OID registered for
/// GlobalPlatform SE access control. The DODF entry carrying this OID points
/// at the Access Control Main File.
pub const GPD_OID: [u8; 10] = [0x2A, 0x86, 0x48, 0x86, 0xFC, 0x6B, 0x81, 0x48, 0x01, 0x01];

/// The two tag bytes of the Response-ALL-REF-AR-DO wrapping the rule stream
/// returned by GET DATA [all]
pub const ALL_REF_AR_DO: [u8; 2] = [0xFF, 0x40];

/// The two tag bytes of the refresh tag data object (DF 20)
pub const REFRESH_TAG_DO: [u8; 2] = [0xDF, 0x20];

/// Length of the opaque refresh tag value
pub const REFRESH_TAG_LEN: usize = 8;

/// Container tags of the PKCS#15-style files: the value of a node carrying
/// one of these tags is itself a nested TLV list. Everything else decodes as
/// a leaf byte string.
pub const FILE_CONTAINER_TAGS: &[u8] = &[
    tags::SEQUENCE,
    tags::FCP,
    tags::GPD_AID,
    tags::EXTERNAL_DO,
    tags::INDIRECT,
    tags::EF_ODF,
];

/// Container tags of the ARA-M rule stream
pub const RULE_CONTAINER_TAGS: &[u8] = &[tags::REF_AR_DO, tags::REF_DO, tags::AR_DO];
