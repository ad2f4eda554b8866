//! Binary layout constants and shared header (de)serialization for the LAS
//! public header block and its variable-length records. Kept distinct from
//! `reader`/`writer` so both sides agree on the exact byte offsets.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use lidar_common::{Bounds3D, CoreError, CoreResult};
use std::io::{Read, Seek, SeekFrom, Write};

use crate::header::LasHeader;

pub const FILE_SIGNATURE: &[u8; 4] = b"LASF";
pub const WKT_VLR_USER_ID: &str = "LASF_Projection";
pub const WKT_VLR_RECORD_ID: u16 = 2112;

pub struct ParsedHeader {
    pub header: LasHeader,
    pub header_size: u16,
    pub point_data_offset: u32,
    pub num_vlrs: u32,
}

/// Reads the public header block and every VLR, extracting the WKT CRS VLR
/// (record id 2112) if present. Leaves the stream positioned at
/// `point_data_offset`.
pub fn read_header<R: Read + Seek>(reader: &mut R) -> CoreResult<ParsedHeader> {
    let io_err = |e: std::io::Error| CoreError::ReadFailed(e.to_string());

    let mut signature = [0u8; 4];
    reader.read_exact(&mut signature).map_err(io_err)?;
    if &signature != FILE_SIGNATURE {
        return Err(CoreError::ReadFailed(
            "missing LASF file signature".to_string(),
        ));
    }

    reader.seek(SeekFrom::Start(4)).map_err(io_err)?;
    let _file_source_id = reader.read_u16::<LittleEndian>().map_err(io_err)?;
    let _global_encoding = reader.read_u16::<LittleEndian>().map_err(io_err)?;
    reader.seek(SeekFrom::Start(24)).map_err(io_err)?; // skip project ID GUID (16 bytes)
    let version_major = reader.read_u8().map_err(io_err)?;
    let version_minor = reader.read_u8().map_err(io_err)?;
    reader.seek(SeekFrom::Start(26 + 32 + 32)).map_err(io_err)?; // skip system id + generating software
    let _creation_day = reader.read_u16::<LittleEndian>().map_err(io_err)?;
    let _creation_year = reader.read_u16::<LittleEndian>().map_err(io_err)?;
    let header_size = reader.read_u16::<LittleEndian>().map_err(io_err)?;
    let point_data_offset = reader.read_u32::<LittleEndian>().map_err(io_err)?;
    let num_vlrs = reader.read_u32::<LittleEndian>().map_err(io_err)?;
    let point_format_raw = reader.read_u8().map_err(io_err)?;
    let point_format = point_format_raw & 0x7F; // high bit signals LAZ compression
    if point_format_raw & 0x80 != 0 {
        log::warn!("LAZ-compressed point format {} with no codec collaborator in this workspace", point_format);
        return Err(CoreError::CodecUnavailable);
    }
    let point_record_length = reader.read_u16::<LittleEndian>().map_err(io_err)?;
    let legacy_point_count = reader.read_u32::<LittleEndian>().map_err(io_err)?;
    reader.seek(SeekFrom::Start(131)).map_err(io_err)?; // skip legacy points-by-return (5 x u32)

    let x_scale = reader.read_f64::<LittleEndian>().map_err(io_err)?;
    let y_scale = reader.read_f64::<LittleEndian>().map_err(io_err)?;
    let z_scale = reader.read_f64::<LittleEndian>().map_err(io_err)?;
    let x_offset = reader.read_f64::<LittleEndian>().map_err(io_err)?;
    let y_offset = reader.read_f64::<LittleEndian>().map_err(io_err)?;
    let z_offset = reader.read_f64::<LittleEndian>().map_err(io_err)?;
    let max_x = reader.read_f64::<LittleEndian>().map_err(io_err)?;
    let min_x = reader.read_f64::<LittleEndian>().map_err(io_err)?;
    let max_y = reader.read_f64::<LittleEndian>().map_err(io_err)?;
    let min_y = reader.read_f64::<LittleEndian>().map_err(io_err)?;
    let max_z = reader.read_f64::<LittleEndian>().map_err(io_err)?;
    let min_z = reader.read_f64::<LittleEndian>().map_err(io_err)?;

    let mut point_count = legacy_point_count as u64;
    if header_size >= 375 {
        // LAS 1.4: "number of point records" sits at offset 247, after the
        // start-of-first-EVLR (u64) and number-of-EVLRs (u32) fields added
        // beyond the 1.3 header tail.
        reader.seek(SeekFrom::Start(247)).map_err(io_err)?;
        let extended_point_count = reader.read_u64::<LittleEndian>().map_err(io_err)?;
        if extended_point_count > 0 {
            point_count = extended_point_count;
        }
    }

    let mut crs = None;
    reader
        .seek(SeekFrom::Start(header_size as u64))
        .map_err(io_err)?;
    for _ in 0..num_vlrs {
        let _reserved = reader.read_u16::<LittleEndian>().map_err(io_err)?;
        let mut user_id = [0u8; 16];
        reader.read_exact(&mut user_id).map_err(io_err)?;
        let record_id = reader.read_u16::<LittleEndian>().map_err(io_err)?;
        let record_length = reader.read_u16::<LittleEndian>().map_err(io_err)?;
        let mut description = [0u8; 32];
        reader.read_exact(&mut description).map_err(io_err)?;
        let mut data = vec![0u8; record_length as usize];
        reader.read_exact(&mut data).map_err(io_err)?;
        if record_id == WKT_VLR_RECORD_ID {
            let text = String::from_utf8_lossy(&data)
                .trim_end_matches('\0')
                .to_string();
            crs = Some(text);
        }
    }

    let header = LasHeader {
        version_major,
        version_minor,
        point_format,
        point_record_length,
        scale: (x_scale, y_scale, z_scale),
        offset: (x_offset, y_offset, z_offset),
        bounds: Bounds3D::new((min_x, min_y, min_z), (max_x, max_y, max_z)),
        point_count,
        crs,
    };

    Ok(ParsedHeader {
        header,
        header_size,
        point_data_offset,
        num_vlrs,
    })
}

/// Header size for LAS 1.2 (no waveform/extended fields).
pub const HEADER_SIZE_V12: u16 = 227;
/// Header size for LAS 1.4 (adds waveform offset + extended VLR/point counts).
pub const HEADER_SIZE_V14: u16 = 375;

pub struct WriteHeaderArgs<'a> {
    pub version_major: u8,
    pub version_minor: u8,
    pub point_format: u8,
    pub point_record_length: u16,
    pub scale: (f64, f64, f64),
    pub offset: (f64, f64, f64),
    pub bounds: Bounds3D,
    pub point_count: u64,
    pub crs: Option<&'a str>,
}

/// Writes the public header block plus, when a CRS is present, a single WKT
/// VLR (record id 2112). Returns the byte offset at which point records
/// begin.
pub fn write_header<W: Write>(writer: &mut W, args: &WriteHeaderArgs) -> CoreResult<u32> {
    let io_err = |e: std::io::Error| CoreError::WriteFailed(e.to_string());
    let header_size = if args.version_minor >= 4 {
        HEADER_SIZE_V14
    } else {
        HEADER_SIZE_V12
    };

    let wkt_bytes = args.crs.map(|s| s.as_bytes().to_vec());
    let num_vlrs: u32 = if wkt_bytes.is_some() { 1 } else { 0 };
    let vlr_bytes_len: u32 = wkt_bytes
        .as_ref()
        .map(|b| (54 + b.len()) as u32)
        .unwrap_or(0);
    let point_data_offset = header_size as u32 + vlr_bytes_len;

    writer.write_all(FILE_SIGNATURE).map_err(io_err)?;
    writer.write_u16::<LittleEndian>(0).map_err(io_err)?; // file source id
    writer.write_u16::<LittleEndian>(0).map_err(io_err)?; // global encoding
    writer.write_all(&[0u8; 16]).map_err(io_err)?; // project id GUID
    writer.write_u8(args.version_major).map_err(io_err)?;
    writer.write_u8(args.version_minor).map_err(io_err)?;
    let mut system_id = [0u8; 32];
    system_id[..10].copy_from_slice(b"CANOPYPIPE");
    writer.write_all(&system_id).map_err(io_err)?;
    let mut software_id = [0u8; 32];
    software_id[..15].copy_from_slice(b"canopy-pipeline");
    writer.write_all(&software_id).map_err(io_err)?;
    writer.write_u16::<LittleEndian>(1).map_err(io_err)?; // creation day-of-year
    writer.write_u16::<LittleEndian>(1970).map_err(io_err)?; // creation year
    writer
        .write_u16::<LittleEndian>(header_size)
        .map_err(io_err)?;
    writer
        .write_u32::<LittleEndian>(point_data_offset)
        .map_err(io_err)?;
    writer.write_u32::<LittleEndian>(num_vlrs).map_err(io_err)?;
    writer.write_u8(args.point_format).map_err(io_err)?;
    writer
        .write_u16::<LittleEndian>(args.point_record_length)
        .map_err(io_err)?;
    let legacy_count = if args.point_count <= u32::MAX as u64 {
        args.point_count as u32
    } else {
        0
    };
    writer
        .write_u32::<LittleEndian>(legacy_count)
        .map_err(io_err)?;
    for _ in 0..5 {
        writer.write_u32::<LittleEndian>(0).map_err(io_err)?; // legacy points by return
    }
    writer.write_f64::<LittleEndian>(args.scale.0).map_err(io_err)?;
    writer.write_f64::<LittleEndian>(args.scale.1).map_err(io_err)?;
    writer.write_f64::<LittleEndian>(args.scale.2).map_err(io_err)?;
    writer.write_f64::<LittleEndian>(args.offset.0).map_err(io_err)?;
    writer.write_f64::<LittleEndian>(args.offset.1).map_err(io_err)?;
    writer.write_f64::<LittleEndian>(args.offset.2).map_err(io_err)?;
    writer.write_f64::<LittleEndian>(args.bounds.max_x).map_err(io_err)?;
    writer.write_f64::<LittleEndian>(args.bounds.min_x).map_err(io_err)?;
    writer.write_f64::<LittleEndian>(args.bounds.max_y).map_err(io_err)?;
    writer.write_f64::<LittleEndian>(args.bounds.min_y).map_err(io_err)?;
    writer.write_f64::<LittleEndian>(args.bounds.max_z).map_err(io_err)?;
    writer.write_f64::<LittleEndian>(args.bounds.min_z).map_err(io_err)?;

    if header_size == HEADER_SIZE_V14 {
        writer.write_u64::<LittleEndian>(0).map_err(io_err)?; // waveform data packet start
        writer.write_u64::<LittleEndian>(0).map_err(io_err)?; // start of first EVLR
        writer.write_u32::<LittleEndian>(0).map_err(io_err)?; // number of EVLRs
        writer
            .write_u64::<LittleEndian>(args.point_count)
            .map_err(io_err)?;
        for _ in 0..15 {
            writer.write_u64::<LittleEndian>(0).map_err(io_err)?;
        }
    } else if header_size == HEADER_SIZE_V12 + 8 {
        // LAS 1.3: adds only the waveform data packet start offset.
        writer.write_u64::<LittleEndian>(0).map_err(io_err)?;
    }

    if let Some(bytes) = wkt_bytes {
        writer.write_u16::<LittleEndian>(0).map_err(io_err)?; // reserved
        let mut user_id = [0u8; 16];
        user_id[..WKT_VLR_USER_ID.len()].copy_from_slice(WKT_VLR_USER_ID.as_bytes());
        writer.write_all(&user_id).map_err(io_err)?;
        writer
            .write_u16::<LittleEndian>(WKT_VLR_RECORD_ID)
            .map_err(io_err)?;
        writer
            .write_u16::<LittleEndian>(bytes.len() as u16)
            .map_err(io_err)?;
        writer.write_all(&[0u8; 32]).map_err(io_err)?; // description
        writer.write_all(&bytes).map_err(io_err)?;
    }

    Ok(point_data_offset)
}
