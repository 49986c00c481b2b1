//! Workbook that streams worksheet XML directly into the ZIP compressor
//!
//! Cell text is written as inline strings, so no shared string table has to
//! be held in memory while rows stream through.

use super::zip_writer::StreamingZipWriter;
use crate::error::{ExportError, Result};
use std::io::Write;

const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Maximum sheet name length accepted by Excel
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// Rows per worksheet accepted by Excel
pub const MAX_ROWS: u32 = 1_048_576;

/// Columns per worksheet accepted by Excel
pub const MAX_COLUMNS: usize = 16_384;

/// Streaming workbook over any writer
pub struct StreamingWorkbook<W: Write> {
    zip: StreamingZipWriter<W>,
    worksheets: Vec<String>,
    current_row: u32,
    in_worksheet: bool,
    xml_buffer: Vec<u8>,
}

impl<W: Write> StreamingWorkbook<W> {
    pub fn new(output: W, compression_level: u32) -> Self {
        StreamingWorkbook {
            zip: StreamingZipWriter::new(output, compression_level),
            worksheets: Vec::new(),
            current_row: 0,
            in_worksheet: false,
            xml_buffer: Vec::with_capacity(4096),
        }
    }

    /// Start a new worksheet; the previous one is closed
    pub fn add_worksheet(&mut self, name: &str) -> Result<()> {
        validate_sheet_name(name)?;
        if self.worksheets.iter().any(|n| n.eq_ignore_ascii_case(name)) {
            return Err(ExportError::Write(format!("duplicate sheet name '{}'", name)));
        }

        self.finish_current_worksheet()?;

        self.worksheets.push(name.to_string());
        self.current_row = 0;

        let entry_name = format!("xl/worksheets/sheet{}.xml", self.worksheets.len());
        self.zip.start_entry(&entry_name)?;

        let header = format!(
            "{XML_DECL}\n<worksheet xmlns=\"{NS_MAIN}\" xmlns:r=\"{NS_REL}\">\n<sheetData>"
        );
        self.zip.write_data(header.as_bytes())?;
        self.in_worksheet = true;
        Ok(())
    }

    /// Write one row of cell text to the current worksheet
    ///
    /// Fails without writing anything once the sheet holds [`MAX_ROWS`]
    /// rows, or when the row has more than [`MAX_COLUMNS`] values.
    pub fn write_row<I, S>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !self.in_worksheet {
            return Err(ExportError::Write("No worksheet started".to_string()));
        }
        if self.current_row >= MAX_ROWS {
            return Err(ExportError::Write(format!(
                "worksheet '{}' is full: Excel allows {} rows",
                self.worksheets.last().map(String::as_str).unwrap_or_default(),
                MAX_ROWS
            )));
        }

        let row = self.current_row + 1;

        let mut num_buffer = itoa::Buffer::new();
        self.xml_buffer.clear();
        self.xml_buffer.extend_from_slice(b"<row r=\"");
        self.xml_buffer
            .extend_from_slice(num_buffer.format(row).as_bytes());
        self.xml_buffer.extend_from_slice(b"\">");

        for (col_idx, value) in values.into_iter().enumerate() {
            if col_idx >= MAX_COLUMNS {
                return Err(ExportError::Write(format!(
                    "row {} has more than {} columns",
                    row, MAX_COLUMNS
                )));
            }
            let v = value.as_ref();
            if v.is_empty() {
                continue;
            }

            self.xml_buffer.extend_from_slice(b"<c r=\"");
            push_column_letter(&mut self.xml_buffer, col_idx as u32 + 1);
            self.xml_buffer
                .extend_from_slice(num_buffer.format(row).as_bytes());
            self.xml_buffer.extend_from_slice(b"\" t=\"inlineStr\"><is><t");
            if v.starts_with(char::is_whitespace) || v.ends_with(char::is_whitespace) {
                self.xml_buffer.extend_from_slice(b" xml:space=\"preserve\"");
            }
            self.xml_buffer.push(b'>');
            push_escaped(&mut self.xml_buffer, v);
            self.xml_buffer.extend_from_slice(b"</t></is></c>");
        }

        self.xml_buffer.extend_from_slice(b"</row>");
        self.zip.write_data(&self.xml_buffer)?;
        self.current_row = row;
        Ok(())
    }

    /// Rows written to the current worksheet
    pub fn current_row(&self) -> u32 {
        self.current_row
    }

    /// Names of all worksheets, in order
    pub fn worksheets(&self) -> &[String] {
        &self.worksheets
    }

    fn finish_current_worksheet(&mut self) -> Result<()> {
        if self.in_worksheet {
            self.zip.write_data(b"</sheetData>\n</worksheet>")?;
            self.in_worksheet = false;
        }
        Ok(())
    }

    /// Finish the workbook and return the underlying writer
    ///
    /// A workbook without worksheets gets an empty `Sheet1`, since Excel
    /// refuses to open a file with no sheets.
    pub fn close(mut self) -> Result<W> {
        if self.worksheets.is_empty() {
            self.add_worksheet("Sheet1")?;
        }
        self.finish_current_worksheet()?;

        self.write_content_types()?;
        self.write_rels()?;
        self.write_workbook()?;
        self.write_workbook_rels()?;
        self.write_styles()?;
        self.write_app_props()?;
        self.write_core_props()?;

        self.zip.finish()
    }

    fn write_entry(&mut self, name: &str, xml: &str) -> Result<()> {
        self.zip.start_entry(name)?;
        self.zip.write_data(xml.as_bytes())
    }

    fn write_content_types(&mut self) -> Result<()> {
        let mut xml = format!(
            r#"{XML_DECL}
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>
<Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>
<Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/>"#
        );
        for i in 1..=self.worksheets.len() {
            xml.push_str(&format!(
                "\n<Override PartName=\"/xl/worksheets/sheet{i}.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>"
            ));
        }
        xml.push_str("\n</Types>");
        self.write_entry("[Content_Types].xml", &xml)
    }

    fn write_rels(&mut self) -> Result<()> {
        let xml = format!(
            r#"{XML_DECL}
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>
<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/>
</Relationships>"#
        );
        self.write_entry("_rels/.rels", &xml)
    }

    fn write_workbook(&mut self) -> Result<()> {
        let mut xml = Vec::with_capacity(512);
        xml.extend_from_slice(
            format!("{XML_DECL}\n<workbook xmlns=\"{NS_MAIN}\" xmlns:r=\"{NS_REL}\">\n<sheets>")
                .as_bytes(),
        );
        for (i, name) in self.worksheets.iter().enumerate() {
            xml.extend_from_slice(b"\n<sheet name=\"");
            push_escaped(&mut xml, name);
            xml.extend_from_slice(format!("\" sheetId=\"{}\" r:id=\"rId{}\"/>", i + 1, i + 1).as_bytes());
        }
        xml.extend_from_slice(b"\n</sheets>\n</workbook>");

        self.zip.start_entry("xl/workbook.xml")?;
        self.zip.write_data(&xml)
    }

    fn write_workbook_rels(&mut self) -> Result<()> {
        let count = self.worksheets.len();
        let mut xml = format!(
            "{XML_DECL}\n<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">"
        );
        for i in 1..=count {
            xml.push_str(&format!(
                "\n<Relationship Id=\"rId{i}\" Type=\"{NS_REL}/worksheet\" Target=\"worksheets/sheet{i}.xml\"/>"
            ));
        }
        xml.push_str(&format!(
            "\n<Relationship Id=\"rId{}\" Type=\"{NS_REL}/styles\" Target=\"styles.xml\"/>\n</Relationships>",
            count + 1
        ));
        self.write_entry("xl/_rels/workbook.xml.rels", &xml)
    }

    fn write_styles(&mut self) -> Result<()> {
        let xml = format!(
            r#"{XML_DECL}
<styleSheet xmlns="{NS_MAIN}">
<fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts>
<fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>
<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>
<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>
<cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs>
</styleSheet>"#
        );
        self.write_entry("xl/styles.xml", &xml)
    }

    fn write_app_props(&mut self) -> Result<()> {
        let xml = format!(
            r#"{XML_DECL}
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties">
<Application>sqlsheet</Application>
</Properties>"#
        );
        self.write_entry("docProps/app.xml", &xml)
    }

    fn write_core_props(&mut self) -> Result<()> {
        let now = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
        let xml = format!(
            r#"{XML_DECL}
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
<dc:creator>sqlsheet</dc:creator>
<dcterms:created xsi:type="dcterms:W3CDTF">{now}</dcterms:created>
</cp:coreProperties>"#
        );
        self.write_entry("docProps/core.xml", &xml)
    }
}

/// Reject names Excel would refuse to open
pub fn validate_sheet_name(name: &str) -> Result<()> {
    const FORBIDDEN: [char; 7] = ['\\', '/', '?', '*', '[', ']', ':'];

    if name.is_empty() || name.chars().count() > MAX_SHEET_NAME_LEN {
        return Err(ExportError::Write(format!(
            "sheet name must be 1-{} characters: '{}'",
            MAX_SHEET_NAME_LEN, name
        )));
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN.contains(c)) {
        return Err(ExportError::Write(format!(
            "sheet name '{}' contains '{}'",
            name, c
        )));
    }
    Ok(())
}

/// Append the column letters for 1-based column `n` (1 -> A, 27 -> AA)
fn push_column_letter(buffer: &mut Vec<u8>, mut n: u32) {
    let mut tmp = [0u8; 8];
    let mut len = 0;
    while n > 0 {
        let rem = (n - 1) % 26;
        tmp[len] = b'A' + rem as u8;
        len += 1;
        n = (n - 1) / 26;
    }
    buffer.extend(tmp[..len].iter().rev());
}

/// Append `s` with XML escaping; control characters not allowed in XML 1.0
/// are dropped
fn push_escaped(buffer: &mut Vec<u8>, s: &str) {
    for c in s.chars() {
        match c {
            '&' => buffer.extend_from_slice(b"&amp;"),
            '<' => buffer.extend_from_slice(b"&lt;"),
            '>' => buffer.extend_from_slice(b"&gt;"),
            '"' => buffer.extend_from_slice(b"&quot;"),
            '\'' => buffer.extend_from_slice(b"&apos;"),
            '\t' | '\n' | '\r' => buffer.push(c as u8),
            c if (c as u32) < 0x20 => {}
            _ => {
                let mut buf = [0; 4];
                buffer.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
}
