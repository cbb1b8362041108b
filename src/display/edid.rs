//! EDID parsing
//!
//! Decodes the 128-byte base block and CEA-861 extensions into display
//! capabilities (HDR support, luminance limits, wide gamut, VRR range) and
//! the declared timing list. Every block must pass the zero-sum-mod-256
//! checksum or the whole EDID is rejected.

use crate::error::{Error, Result};
use crate::types::DisplayMode;

const BLOCK_SIZE: usize = 128;
const HEADER: [u8; 8] = [0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00];

const CEA_EXTENSION_TAG: u8 = 0x02;
const DESCRIPTOR_MONITOR_NAME: u8 = 0xFC;

// CEA-861 data block tags
const TAG_VENDOR_SPECIFIC: u8 = 3;
const TAG_EXTENDED: u8 = 7;
const EXT_TAG_COLORIMETRY: u8 = 5;
const EXT_TAG_HDR_STATIC: u8 = 6;

const OUI_HDMI_FORUM: u32 = 0xC45DD8;
const OUI_DOLBY: u32 = 0x00D046;

/// Display capabilities advertised by the EDID
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DisplayCaps {
    pub supports_hdr10: bool,
    pub supports_hlg: bool,
    pub supports_dolby_vision: bool,
    /// cd/m², 0 when not advertised
    pub max_luminance: f32,
    pub max_frame_avg: f32,
    pub min_luminance: f32,
    pub bt2020: bool,
    pub dci_p3: bool,
    /// (min Hz, max Hz) when variable refresh is advertised
    pub vrr_range: Option<(u32, u32)>,
}

#[derive(Debug, Clone, Default)]
pub struct EdidInfo {
    pub manufacturer: String,
    pub product_code: u16,
    pub serial: u32,
    pub week: u8,
    pub year: u16,
    pub monitor_name: Option<String>,
    pub timings: Vec<DisplayMode>,
    pub caps: DisplayCaps,
}

/// Parse a full EDID (base block plus extensions)
pub fn parse(data: &[u8]) -> Result<EdidInfo> {
    if data.len() < BLOCK_SIZE {
        return Err(Error::InvalidData(format!(
            "EDID too short: {} bytes",
            data.len()
        )));
    }
    if data[..8] != HEADER {
        return Err(Error::InvalidData("EDID header mismatch".into()));
    }
    verify_checksum(&data[..BLOCK_SIZE], 0)?;

    let mut info = EdidInfo {
        manufacturer: decode_manufacturer(u16::from_be_bytes([data[8], data[9]])),
        product_code: u16::from_le_bytes([data[10], data[11]]),
        serial: u32::from_le_bytes([data[12], data[13], data[14], data[15]]),
        week: data[16],
        year: 1990 + data[17] as u16,
        ..Default::default()
    };

    parse_standard_timings(&data[38..54], &mut info.timings);
    for offset in [54, 72, 90, 108] {
        parse_descriptor(&data[offset..offset + 18], &mut info);
    }

    let extension_count = data[126] as usize;
    for block_idx in 1..=extension_count {
        let start = block_idx * BLOCK_SIZE;
        let Some(block) = data.get(start..start + BLOCK_SIZE) else {
            return Err(Error::InvalidData(format!(
                "EDID advertises {extension_count} extensions but only {} bytes present",
                data.len()
            )));
        };
        verify_checksum(block, block_idx)?;
        if block[0] == CEA_EXTENSION_TAG {
            parse_cea_extension(block, &mut info);
        }
    }

    Ok(info)
}

fn verify_checksum(block: &[u8], index: usize) -> Result<()> {
    let sum: u8 = block.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    if sum != 0 {
        return Err(Error::InvalidData(format!(
            "EDID block {index} checksum failed (sum {sum})"
        )));
    }
    Ok(())
}

/// Three packed 5-bit letters, '@' + value
fn decode_manufacturer(id: u16) -> String {
    let letters = [
        ((id >> 10) & 0x1F) as u8,
        ((id >> 5) & 0x1F) as u8,
        (id & 0x1F) as u8,
    ];
    letters.iter().map(|&c| (b'@' + c) as char).collect()
}

fn parse_standard_timings(bytes: &[u8], timings: &mut Vec<DisplayMode>) {
    for pair in bytes.chunks_exact(2) {
        if pair[0] == 0x01 && pair[1] == 0x01 {
            continue;
        }
        let width = (pair[0] as u32 + 31) * 8;
        let height = match (pair[1] >> 6) & 0x3 {
            0 => width * 10 / 16,
            1 => width * 3 / 4,
            2 => width * 4 / 5,
            _ => width * 9 / 16,
        };
        let refresh = ((pair[1] & 0x3F) + 60) as f32;
        timings.push(DisplayMode {
            width,
            height,
            refresh_rate: refresh,
            ..Default::default()
        });
    }
}

fn parse_descriptor(desc: &[u8], info: &mut EdidInfo) {
    let pixel_clock = u16::from_le_bytes([desc[0], desc[1]]);
    if pixel_clock == 0 {
        // Display descriptor
        if desc[3] == DESCRIPTOR_MONITOR_NAME {
            let name: String = desc[5..18]
                .iter()
                .take_while(|&&b| b != 0x0A)
                .map(|&b| b as char)
                .collect();
            let trimmed = name.trim().to_string();
            if !trimmed.is_empty() {
                info.monitor_name = Some(trimmed);
            }
        }
        return;
    }
    if let Some(mode) = parse_detailed_timing(desc) {
        info.timings.push(mode);
    }
}

/// 18-byte detailed timing descriptor
fn parse_detailed_timing(desc: &[u8]) -> Option<DisplayMode> {
    let pixel_clock = u16::from_le_bytes([desc[0], desc[1]]);
    if pixel_clock == 0 {
        return None;
    }
    let clock_khz = pixel_clock as u32 * 10;

    let h_active = desc[2] as u32 | (((desc[4] & 0xF0) as u32) << 4);
    let h_blank = desc[3] as u32 | (((desc[4] & 0x0F) as u32) << 8);
    let v_active = desc[5] as u32 | (((desc[7] & 0xF0) as u32) << 4);
    let v_blank = desc[6] as u32 | (((desc[7] & 0x0F) as u32) << 8);

    let h_sync_offset = desc[8] as u32 | (((desc[11] & 0xC0) as u32) << 2);
    let h_sync_width = desc[9] as u32 | (((desc[11] & 0x30) as u32) << 4);
    let v_sync_offset = ((desc[10] >> 4) as u32) | (((desc[11] & 0x0C) as u32) << 2);
    let v_sync_width = ((desc[10] & 0x0F) as u32) | (((desc[11] & 0x03) as u32) << 4);

    let interlaced = desc[17] & 0x80 != 0;

    let htotal = h_active + h_blank;
    let vtotal = v_active + v_blank;
    if htotal == 0 || vtotal == 0 {
        return None;
    }
    let refresh = clock_khz as f64 * 1000.0 / (htotal as f64 * vtotal as f64);

    Some(DisplayMode {
        width: h_active,
        height: v_active,
        refresh_rate: refresh as f32,
        interlaced,
        clock_khz,
        htotal,
        hsync_start: h_active + h_sync_offset,
        hsync_end: h_active + h_sync_offset + h_sync_width,
        vtotal,
        vsync_start: v_active + v_sync_offset,
        vsync_end: v_active + v_sync_offset + v_sync_width,
    })
}

fn parse_cea_extension(block: &[u8], info: &mut EdidInfo) {
    let dtd_offset = block[2] as usize;

    // Data block collection runs from byte 4 to the DTD offset
    if dtd_offset >= 4 {
        let mut pos = 4usize;
        while pos < dtd_offset.min(BLOCK_SIZE - 1) {
            let header = block[pos];
            let tag = header >> 5;
            let length = (header & 0x1F) as usize;
            if pos + 1 + length > BLOCK_SIZE {
                break;
            }
            let payload = &block[pos + 1..pos + 1 + length];
            match tag {
                TAG_EXTENDED => parse_extended_block(payload, info),
                TAG_VENDOR_SPECIFIC => parse_vendor_block(&block[pos..pos + 1 + length], info),
                _ => {}
            }
            pos += 1 + length;
        }
    }

    // Detailed timing descriptors after the data blocks
    if dtd_offset >= 4 {
        let mut pos = dtd_offset;
        while pos + 18 <= BLOCK_SIZE - 1 {
            if block[pos] == 0 && block[pos + 1] == 0 {
                break;
            }
            if let Some(mode) = parse_detailed_timing(&block[pos..pos + 18]) {
                info.timings.push(mode);
            }
            pos += 18;
        }
    }
}

fn parse_extended_block(payload: &[u8], info: &mut EdidInfo) {
    if payload.is_empty() {
        return;
    }
    match payload[0] {
        EXT_TAG_COLORIMETRY => {
            if payload.len() >= 2 {
                info.caps.bt2020 = payload[1] & (1 << 3) != 0;
                info.caps.dci_p3 = payload[1] & (1 << 7) != 0;
            }
        }
        EXT_TAG_HDR_STATIC => {
            if payload.len() >= 2 {
                let eotf = payload[1];
                info.caps.supports_hdr10 = eotf & (1 << 2) != 0;
                info.caps.supports_hlg = eotf & (1 << 3) != 0;
            }
            if payload.len() >= 4 {
                info.caps.max_luminance = luminance_from_code(payload[3]);
            }
            if payload.len() >= 5 {
                info.caps.max_frame_avg = luminance_from_code(payload[4]);
            }
            if payload.len() >= 6 && info.caps.max_luminance > 0.0 {
                let code = payload[5] as f32;
                info.caps.min_luminance =
                    info.caps.max_luminance * (code / 255.0) * (code / 255.0) / 100.0;
            }
        }
        _ => {}
    }
}

/// `50 · 2^(code/32)` cd/m²
fn luminance_from_code(code: u8) -> f32 {
    50.0 * 2f32.powf(code as f32 / 32.0)
}

/// `block` includes the header byte, so offsets match the wire layout
fn parse_vendor_block(block: &[u8], info: &mut EdidInfo) {
    if block.len() < 4 {
        return;
    }
    let oui = block[1] as u32 | (block[2] as u32) << 8 | (block[3] as u32) << 16;
    match oui {
        OUI_HDMI_FORUM => {
            if block.len() > 9 && block[7] & (1 << 6) != 0 {
                let min_hz = (block[8] & 0x3F) as u32;
                let max_hz = block[9] as u32 * 2;
                if max_hz > 0 {
                    info.caps.vrr_range = Some((min_hz, max_hz));
                }
            }
        }
        OUI_DOLBY => {
            info.caps.supports_dolby_vision = true;
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix_checksum(block: &mut [u8]) {
        let sum: u8 = block[..127].iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        block[127] = 0u8.wrapping_sub(sum);
    }

    /// Minimal valid base block: header, "LMB" manufacturer, one standard
    /// timing, monitor name descriptor
    fn base_block() -> [u8; 128] {
        let mut block = [0u8; 128];
        block[..8].copy_from_slice(&HEADER);

        // 'L'=12, 'M'=13, 'B'=2 -> 0b0_01100_01101_00010
        let id: u16 = (12 << 10) | (13 << 5) | 2;
        block[8..10].copy_from_slice(&id.to_be_bytes());
        block[10..12].copy_from_slice(&0x1234u16.to_le_bytes());
        block[12..16].copy_from_slice(&777u32.to_le_bytes());
        block[16] = 12; // week
        block[17] = 35; // 2025

        // Fill standard timings with "unused"
        for pair in block[38..54].chunks_exact_mut(2) {
            pair.copy_from_slice(&[0x01, 0x01]);
        }
        // One real standard timing: 1920x1080@60 -> (1920/8-31)=209, aspect 16:9, 60 Hz
        block[38] = 209;
        block[39] = 0b11_000000;

        // Monitor name descriptor at offset 54
        block[54] = 0;
        block[55] = 0;
        block[57] = DESCRIPTOR_MONITOR_NAME;
        let name = b"LMB DISPLAY\x0A ";
        block[59..59 + name.len()].copy_from_slice(name);

        fix_checksum(&mut block);
        block
    }

    /// CEA extension with an HDR static metadata block (S6 vector) and an
    /// HDMI Forum VSDB advertising VRR 40-120
    fn cea_block() -> [u8; 128] {
        let mut block = [0u8; 128];
        block[0] = CEA_EXTENSION_TAG;
        block[1] = 0x03;

        let mut pos = 4usize;
        // Extended tag 6: HDR static metadata, EOTF = PQ only
        block[pos] = (TAG_EXTENDED << 5) | 6; // length 6
        block[pos + 1] = EXT_TAG_HDR_STATIC;
        block[pos + 2] = 0x04; // bit 2: PQ
        block[pos + 3] = 0x01; // metadata type 1
        block[pos + 4] = 0xA0; // max luminance code 160
        block[pos + 5] = 0x80; // max frame avg code 128
        block[pos + 6] = 0x10; // min luminance code 16
        pos += 7;

        // Extended tag 5: colorimetry, BT.2020 cYCC + DCI-P3
        block[pos] = (TAG_EXTENDED << 5) | 2;
        block[pos + 1] = EXT_TAG_COLORIMETRY;
        block[pos + 2] = (1 << 3) | (1 << 7);
        pos += 3;

        // HDMI Forum VSDB with VRR: header + OUI + 6 payload bytes
        block[pos] = (TAG_VENDOR_SPECIFIC << 5) | 9;
        block[pos + 1] = 0xD8;
        block[pos + 2] = 0x5D;
        block[pos + 3] = 0xC4;
        block[pos + 4] = 0x01; // version
        block[pos + 5] = 0x00;
        block[pos + 6] = 0x00;
        block[pos + 7] = 1 << 6; // VRR capable
        block[pos + 8] = 40; // min Hz
        block[pos + 9] = 60; // max Hz x2 = 120
        pos += 10;

        block[2] = pos as u8; // DTD offset: no DTDs

        fix_checksum(&mut block);
        block
    }

    fn full_edid() -> Vec<u8> {
        let mut base = base_block();
        base[126] = 1;
        fix_checksum(&mut base);
        let mut edid = base.to_vec();
        edid.extend_from_slice(&cea_block());
        edid
    }

    #[test]
    fn base_block_fields_decode() {
        let info = parse(&base_block()).unwrap();
        assert_eq!(info.manufacturer, "LMB");
        assert_eq!(info.product_code, 0x1234);
        assert_eq!(info.serial, 777);
        assert_eq!(info.week, 12);
        assert_eq!(info.year, 2025);
        assert_eq!(info.monitor_name.as_deref(), Some("LMB DISPLAY"));
    }

    #[test]
    fn standard_timing_decodes() {
        let info = parse(&base_block()).unwrap();
        let timing = &info.timings[0];
        assert_eq!(timing.width, 1920);
        assert_eq!(timing.height, 1080);
        assert_eq!(timing.refresh_rate, 60.0);
    }

    #[test]
    fn bad_checksum_is_rejected() {
        let mut block = base_block();
        block[20] ^= 0xFF;
        assert!(matches!(parse(&block), Err(Error::InvalidData(_))));
    }

    #[test]
    fn bad_extension_checksum_is_rejected() {
        let mut edid = full_edid();
        edid[128 + 40] ^= 0x01;
        assert!(parse(&edid).is_err());
    }

    #[test]
    fn bad_header_is_rejected() {
        let mut block = base_block();
        block[0] = 0x42;
        assert!(parse(&block).is_err());
    }

    #[test]
    fn hdr_static_metadata_advertises_hdr10() {
        let info = parse(&full_edid()).unwrap();
        assert!(info.caps.supports_hdr10);
        assert!(!info.caps.supports_hlg);

        // 50 * 2^(160/32) = 1600
        assert!((info.caps.max_luminance - 1600.0).abs() < 0.5);
        // 50 * 2^(128/32) = 800
        assert!((info.caps.max_frame_avg - 800.0).abs() < 0.5);
        // 1600 * (16/255)^2 / 100 ≈ 0.063
        assert!((info.caps.min_luminance - 0.063).abs() < 0.001);
    }

    #[test]
    fn colorimetry_and_vrr_decode() {
        let info = parse(&full_edid()).unwrap();
        assert!(info.caps.bt2020);
        assert!(info.caps.dci_p3);
        assert_eq!(info.caps.vrr_range, Some((40, 120)));
    }

    #[test]
    fn detailed_timing_decodes() {
        let mut block = base_block();
        // 1920x1080@60: clock 148.5 MHz = 14850 * 10 kHz
        // htotal 2200, vtotal 1125
        let desc = &mut block[72..90];
        desc[0..2].copy_from_slice(&14850u16.to_le_bytes());
        desc[2] = (1920 & 0xFF) as u8;
        desc[3] = (280 & 0xFF) as u8; // h blank 280
        desc[4] = (((1920 >> 8) as u8) << 4) | ((280 >> 8) as u8);
        desc[5] = (1080 & 0xFF) as u8;
        desc[6] = 45; // v blank
        desc[7] = ((1080u32 >> 8) as u8) << 4;
        desc[8] = 88; // hsync offset
        desc[9] = 44; // hsync width
        desc[10] = (4 << 4) | 5; // vsync offset 4, width 5
        fix_checksum(&mut block);

        let info = parse(&block).unwrap();
        let mode = info
            .timings
            .iter()
            .find(|m| m.clock_khz == 148_500)
            .expect("detailed timing parsed");
        assert_eq!(mode.width, 1920);
        assert_eq!(mode.height, 1080);
        assert_eq!(mode.htotal, 2200);
        assert_eq!(mode.vtotal, 1125);
        assert!((mode.refresh_rate - 60.0).abs() < 0.01);
        assert_eq!(mode.hsync_start, 2008);
        assert_eq!(mode.hsync_end, 2052);
        assert!(!mode.interlaced);
    }

    #[test]
    fn manufacturer_letters_decode() {
        // 'A'=1 'B'=2 'C'=3
        let id: u16 = (1 << 10) | (2 << 5) | 3;
        assert_eq!(decode_manufacturer(id), "ABC");
    }
}
