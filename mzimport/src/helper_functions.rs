use std::{
    fs::File,
    io::{BufReader, Read},
    num::{IntErrorKind, ParseIntError},
    ops::Range,
    path::Path,
};

use flate2::bufread::GzDecoder;

use crate::ImportError;

/// Helper function to check extensions in filenames
pub(crate) fn check_extension(filename: impl AsRef<Path>, extension: impl AsRef<Path>) -> bool {
    filename
        .as_ref()
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension.as_ref()))
}

/// Get the lowercase extension of a file, looking through a trailing `.gz`
pub(crate) fn actual_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ex| {
            ex.eq_ignore_ascii_case("gz")
                .then_some(path)
                .and_then(|p| p.file_stem())
                .and_then(|p| Path::new(p).extension())
                .unwrap_or(ex)
        })
        .map(|ex| ex.to_string_lossy().to_lowercase())
}

/// The file name of a path, without a trailing `.gz`
pub(crate) fn file_name(path: &Path) -> String {
    let path = if check_extension(path, "gz") {
        path.file_stem().map_or(path, Path::new)
    } else {
        path
    };
    path.file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().to_string())
}

/// The base name of a path as written by a search engine, this can be a path from another OS
pub(crate) fn foreign_file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Read a complete file to a string, decompressing it first if it is gzipped
pub(crate) fn read_to_string(path: &Path) -> Result<String, ImportError> {
    let io_error = |source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_error)?;
    let mut text = String::new();
    if check_extension(path, "gz") {
        GzDecoder::new(BufReader::new(file))
            .read_to_string(&mut text)
            .map_err(io_error)?;
    } else {
        BufReader::new(file)
            .read_to_string(&mut text)
            .map_err(io_error)?;
    }
    Ok(text)
}

/// To be used as `The xx number ` + the explanation from here (does not have a dot).
pub(crate) const fn explain_number_error(error: &ParseIntError) -> &'static str {
    match error.kind() {
        IntErrorKind::Empty => "is empty",
        IntErrorKind::InvalidDigit => "contains an invalid character",
        IntErrorKind::NegOverflow => "is too small to fit in the internal representation",
        IntErrorKind::PosOverflow => "is too big to fit in the internal representation",
        IntErrorKind::Zero => "is zero, which is not allowed here",
        _ => "is not a valid number",
    }
}

/// Parse a floating point number, rejecting `NaN` and infinities
pub(crate) fn parse_finite(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Split the text on the separator, ignoring any separators inside double quoted stretches
pub(crate) fn split_outside_quotes(text: &str, separator: u8) -> Vec<Range<usize>> {
    let mut quoted = false;
    let mut last_field = 0;
    let mut fields = Vec::new();
    for (index, byte) in text.bytes().enumerate() {
        if byte == b'"' {
            quoted = !quoted;
        } else if byte == separator && !quoted {
            fields.push(last_field..index);
            last_field = index + 1;
        }
    }
    fields.push(last_field..text.len());
    fields
}

/// Decode `%XX` escapes, invalid escapes are kept as is
pub(crate) fn percent_decode(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%'
            && let Some(value) = bytes
                .get(index + 1..index + 3)
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
        {
            decoded.push(value);
            index += 3;
        } else {
            decoded.push(bytes[index]);
            index += 1;
        }
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

#[test]
fn test_split_outside_quotes() {
    let text = r#""sp|P1|A_HUMAN":0:1:9:1,"tr|Q2,X|B":0:5:13:1"#;
    let fields: Vec<&str> = split_outside_quotes(text, b',')
        .into_iter()
        .map(|r| &text[r])
        .collect();
    assert_eq!(
        fields,
        vec![r#""sp|P1|A_HUMAN":0:1:9:1"#, r#""tr|Q2,X|B":0:5:13:1"#]
    );
    assert_eq!(split_outside_quotes("", b','), vec![0..0]);
}

#[test]
fn test_parse_finite() {
    assert_eq!(parse_finite(" 1.5e-3 "), Some(0.0015));
    assert_eq!(parse_finite("-12"), Some(-12.0));
    assert_eq!(parse_finite("NaN"), None);
    assert_eq!(parse_finite("inf"), None);
    assert_eq!(parse_finite("-infinity"), None);
    assert_eq!(parse_finite("1.2.3"), None);
}

#[test]
fn test_percent_decode() {
    assert_eq!(
        percent_decode("File%3a%20sample%2emgf%2c%20scan%3d12"),
        "File: sample.mgf, scan=12"
    );
    assert_eq!(percent_decode("100%"), "100%");
    assert_eq!(percent_decode("%zz"), "%zz");
}

#[test]
fn test_extensions() {
    assert_eq!(
        actual_extension(Path::new("run.DAT.gz")).as_deref(),
        Some("dat")
    );
    assert_eq!(actual_extension(Path::new("run.omx")).as_deref(), Some("omx"));
    assert_eq!(actual_extension(Path::new("run")), None);
    assert_eq!(file_name(Path::new("/data/run.xml.gz")), "run.xml");
    assert_eq!(foreign_file_name(r"C:\data\sample.mgf"), "sample.mgf");
    assert_eq!(foreign_file_name("/data/sample.mgf"), "sample.mgf");
}
