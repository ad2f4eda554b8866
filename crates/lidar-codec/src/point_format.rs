//! Per-point-record encode/decode for LAS point data record formats
//! 0, 1, 2, 3, 6, and 7 (format 8 decodes like 7, dropping the NIR channel).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use lidar_common::{CoreError, CoreResult};
use std::io::{Read, Write};

use crate::header::{has_colour, has_gps_time, is_extended, point_record_length_for_format};

pub struct DecodedPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub intensity: u16,
    pub classification: u8,
    pub return_number: u8,
    pub number_of_returns: u8,
}

/// Reads one point record of `format`, consuming exactly `record_length`
/// bytes (the declared length may exceed the standard fields when extra
/// bytes are present; those are skipped).
pub fn read_point<R: Read>(
    reader: &mut R,
    format: u8,
    record_length: u16,
    scale: (f64, f64, f64),
    offset: (f64, f64, f64),
) -> CoreResult<DecodedPoint> {
    let io_err = |e: std::io::Error| CoreError::ReadFailed(e.to_string());
    let standard_len =
        point_record_length_for_format(format).ok_or(CoreError::UnsupportedPointFormat(format))?;

    let x_raw = reader.read_i32::<LittleEndian>().map_err(io_err)?;
    let y_raw = reader.read_i32::<LittleEndian>().map_err(io_err)?;
    let z_raw = reader.read_i32::<LittleEndian>().map_err(io_err)?;
    let intensity = reader.read_u16::<LittleEndian>().map_err(io_err)?;

    let (return_number, number_of_returns, classification);
    if is_extended(format) {
        let flags1 = reader.read_u8().map_err(io_err)?;
        let _flags2 = reader.read_u8().map_err(io_err)?;
        return_number = (flags1 & 0b0000_1111).max(1);
        number_of_returns = ((flags1 & 0b1111_0000) >> 4).max(1);
        classification = reader.read_u8().map_err(io_err)?;
        let _user_data = reader.read_u8().map_err(io_err)?;
        let _scan_angle = reader.read_i16::<LittleEndian>().map_err(io_err)?;
        let _point_source_id = reader.read_u16::<LittleEndian>().map_err(io_err)?;
    } else {
        let flags = reader.read_u8().map_err(io_err)?;
        return_number = (flags & 0b0000_0111).max(1);
        number_of_returns = ((flags & 0b0011_1000) >> 3).max(1);
        let class_byte = reader.read_u8().map_err(io_err)?;
        classification = class_byte & 0b0001_1111;
        let _scan_angle_rank = reader.read_i8().map_err(io_err)?;
        let _user_data = reader.read_u8().map_err(io_err)?;
        let _point_source_id = reader.read_u16::<LittleEndian>().map_err(io_err)?;
    }

    if has_gps_time(format) {
        let _gps_time = reader.read_f64::<LittleEndian>().map_err(io_err)?;
    }
    if has_colour(format) {
        let mut rgb = [0u8; 6];
        reader.read_exact(&mut rgb).map_err(io_err)?;
    }
    if format == 8 {
        let _nir = reader.read_u16::<LittleEndian>().map_err(io_err)?;
    }

    if record_length > standard_len {
        let mut extra = vec![0u8; (record_length - standard_len) as usize];
        reader.read_exact(&mut extra).map_err(io_err)?;
    }

    Ok(DecodedPoint {
        x: x_raw as f64 * scale.0 + offset.0,
        y: y_raw as f64 * scale.1 + offset.1,
        z: z_raw as f64 * scale.2 + offset.2,
        intensity,
        classification,
        return_number,
        number_of_returns,
    })
}

#[allow(clippy::too_many_arguments)]
pub fn write_point<W: Write>(
    writer: &mut W,
    format: u8,
    scale: (f64, f64, f64),
    offset: (f64, f64, f64),
    x: f64,
    y: f64,
    z: f64,
    intensity: u16,
    classification: u8,
    return_number: u8,
    number_of_returns: u8,
) -> CoreResult<()> {
    let io_err = |e: std::io::Error| CoreError::WriteFailed(e.to_string());

    let x_raw = ((x - offset.0) / scale.0).round() as i32;
    let y_raw = ((y - offset.1) / scale.1).round() as i32;
    let z_raw = ((z - offset.2) / scale.2).round() as i32;

    writer.write_i32::<LittleEndian>(x_raw).map_err(io_err)?;
    writer.write_i32::<LittleEndian>(y_raw).map_err(io_err)?;
    writer.write_i32::<LittleEndian>(z_raw).map_err(io_err)?;
    writer.write_u16::<LittleEndian>(intensity).map_err(io_err)?;

    if is_extended(format) {
        let flags1 = (return_number.clamp(1, 15) & 0x0F) | ((number_of_returns.clamp(1, 15) & 0x0F) << 4);
        writer.write_u8(flags1).map_err(io_err)?;
        writer.write_u8(0).map_err(io_err)?; // flags2: classification flags / channel / scan dir / edge
        writer.write_u8(classification).map_err(io_err)?;
        writer.write_u8(0).map_err(io_err)?; // user data
        writer.write_i16::<LittleEndian>(0).map_err(io_err)?; // scan angle
        writer.write_u16::<LittleEndian>(0).map_err(io_err)?; // point source id
    } else {
        let flags = (return_number.clamp(1, 7) & 0x07) | ((number_of_returns.clamp(1, 7) & 0x07) << 3);
        writer.write_u8(flags).map_err(io_err)?;
        writer.write_u8(classification & 0x1F).map_err(io_err)?;
        writer.write_i8(0).map_err(io_err)?; // scan angle rank
        writer.write_u8(0).map_err(io_err)?; // user data
        writer.write_u16::<LittleEndian>(0).map_err(io_err)?; // point source id
    }

    if has_gps_time(format) {
        writer.write_f64::<LittleEndian>(0.0).map_err(io_err)?;
    }
    if has_colour(format) {
        writer.write_all(&[0u8; 6]).map_err(io_err)?;
    }
    if format == 8 {
        writer.write_u16::<LittleEndian>(0).map_err(io_err)?;
    }

    Ok(())
}
