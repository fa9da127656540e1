use crate::*;

// ============================================================================
//  FIXED-WIDTH SCALARS
// ============================================================================

#[test]
fn test_scalars_are_big_endian() {
    let mut enc = Encoder::new();
    enc.i32(1);
    enc.u32(0xDEAD_BEEF);
    enc.i16(-2);
    enc.i64(0x0102_0304_0506_0708);

    assert_eq!(enc.as_bytes(), &[
        0x00, 0x00, 0x00, 0x01,
        0xDE, 0xAD, 0xBE, 0xEF,
        0xFF, 0xFE,
        0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
    ]);
}

#[test]
fn test_scalars_roundtrip() -> Result<()> {
    let mut enc = Encoder::new();
    enc.bool(true);
    enc.bool(false);
    enc.i8(-128);
    enc.i32(i32::MIN);
    enc.i64(i64::MAX);
    enc.f32(1.5);
    enc.f64(std::f64::consts::PI);

    let bytes = enc.into_bytes();
    let mut dec = Decoder::new(&bytes);

    assert!(dec.bool()?);
    assert!(!dec.bool()?);
    assert_eq!(dec.i8()?, -128);
    assert_eq!(dec.i32()?, i32::MIN);
    assert_eq!(dec.i64()?, i64::MAX);
    assert_eq!(dec.f32()?, 1.5);
    assert_eq!(dec.f64()?, std::f64::consts::PI);
    assert_eq!(dec.remaining(), 0);
    Ok(())
}

#[test]
fn test_short_buffer_is_unexpected_end() {
    let mut dec = Decoder::new(&[0x00, 0x01]);
    assert_eq!(dec.i32(), Err(Error::UnexpectedEnd));
}

// ============================================================================
//  VINT
// ============================================================================

fn vlong_bytes(v: i64) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.vlong(v);
    enc.into_bytes()
}

#[test]
fn test_vlong_single_byte_range() {
    assert_eq!(vlong_bytes(0), vec![0x00]);
    assert_eq!(vlong_bytes(127), vec![0x7F]);
    assert_eq!(vlong_bytes(-1), vec![0xFF]);
    assert_eq!(vlong_bytes(-112), vec![0x90]);
}

#[test]
fn test_vlong_multi_byte_layout() {
    assert_eq!(vlong_bytes(128), vec![0x8F, 0x80]);
    assert_eq!(vlong_bytes(256), vec![0x8E, 0x01, 0x00]);
    assert_eq!(vlong_bytes(-113), vec![0x87, 0x70]);
}

#[test]
fn test_vlong_boundaries_decode() -> Result<()> {
    for v in [0, 127, 128, -112, -113, 255, 256, 65_536, i32::MAX as i64, i64::MAX, i64::MIN] {
        let bytes = vlong_bytes(v);
        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.vlong()?, v, "vlong {} via {:02x?}", v, bytes);
        assert_eq!(dec.remaining(), 0);
    }
    Ok(())
}

#[test]
fn test_vint_rejects_out_of_range() {
    let bytes = vlong_bytes(i64::MAX);
    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.vint(), Err(Error::InvalidLength(i64::MAX)));
}

// ============================================================================
//  STRINGS AND BLOBS
// ============================================================================

#[test]
fn test_text_layout() -> Result<()> {
    let mut enc = Encoder::new();
    enc.text("hrpc")?;
    assert_eq!(enc.as_bytes(), &[0x04, b'h', b'r', b'p', b'c']);

    let bytes = enc.into_bytes();
    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.text()?, "hrpc");
    Ok(())
}

#[test]
fn test_string_null_and_present() -> Result<()> {
    let mut enc = Encoder::new();
    enc.string(None)?;
    enc.string(Some("boom"))?;

    let bytes = enc.into_bytes();
    assert_eq!(&bytes[..4], &[0xFF, 0xFF, 0xFF, 0xFF]);

    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.string()?, None);
    assert_eq!(dec.string()?, Some("boom"));
    Ok(())
}

#[test]
fn test_string_negative_length_is_invalid() {
    let mut enc = Encoder::new();
    enc.i32(-7);
    let bytes = enc.into_bytes();
    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.string(), Err(Error::InvalidLength(-7)));
}

#[test]
fn test_text_invalid_utf8() {
    let mut dec = Decoder::new(&[0x02, 0xC3, 0x28]);
    assert_eq!(dec.text(), Err(Error::InvalidUtf8));
}

#[test]
fn test_reserve_and_patch() {
    let mut enc = Encoder::new();
    let pos = enc.reserve_u32();
    enc.bytes(b"abc");
    enc.patch_u32(pos, 3);
    assert_eq!(enc.as_bytes(), &[0, 0, 0, 3, b'a', b'b', b'c']);
}

// ============================================================================
//  VALUES
// ============================================================================

fn encode(v: &Value) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.value(v).expect("encode value");
    enc.into_bytes()
}

#[test]
fn test_value_text_layout() {
    assert_eq!(encode(&Value::from("pong")), vec![0x0A, 0x04, b'p', b'o', b'n', b'g']);
    assert_eq!(encode(&Value::Null), vec![0x09]);
    assert_eq!(encode(&Value::Long(42)), vec![0x06, 0, 0, 0, 0, 0, 0, 0, 42]);
}

#[test]
fn test_value_row_records_roundtrip() -> Result<()> {
    let put = Put::new("row-1")
        .cell(Cell::new("cf", "a", "1").at(10))
        .cell(Cell::new("cf", "b", "2"));
    let get = Get::new("row-1").family("cf").max_versions(3);
    let result = RowResult { row: b"row-1".to_vec(), cells: put.cells.clone() };

    let original = Value::Array(vec![
        Value::Put(put),
        Value::Get(get),
        Value::RowResult(result),
        Value::BytesArray(vec![b"x".to_vec(), Vec::new()]),
    ]);

    let bytes = encode(&original);
    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.value()?, original);
    assert_eq!(dec.remaining(), 0);
    Ok(())
}

#[test]
fn test_value_unknown_type_code() {
    let mut dec = Decoder::new(&[0x7E]);
    assert_eq!(dec.value(), Err(Error::UnknownTypeCode(0x7E)));
}

#[test]
fn test_value_huge_count_does_not_preallocate() {
    // Array claiming i32::MAX items with no bodies must fail cleanly.
    let mut enc = Encoder::new();
    enc.u8(TypeCode::Array as u8);
    enc.i32(i32::MAX);
    let bytes = enc.into_bytes();

    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.value(), Err(Error::UnexpectedEnd));
}

#[test]
fn test_value_recursion_limit() {
    let mut v = Value::Null;
    for _ in 0..(value::MAX_DEPTH + 2) {
        v = Value::Array(vec![v]);
    }
    let mut enc = Encoder::new();
    assert_eq!(enc.value(&v), Err(Error::RecursionLimitExceeded));
}

#[test]
fn test_row_result_lookup() {
    let result = RowResult {
        row: b"r".to_vec(),
        cells: vec![Cell::new("cf", "a", "1"), Cell::new("cf", "b", "2")],
    };
    assert_eq!(result.value(b"cf", b"b"), Some(&b"2"[..]));
    assert_eq!(result.value(b"cf", b"z"), None);
    assert!(RowResult::default().is_empty());
}
