//! Workbook Assembler: row sets in, xlsx byte buffer out.

use rust_xlsxwriter::{Format, Workbook, XlsxError};

use crate::reports::{CellValue, ReportRow, Sheet};

const DATE_NUM_FORMAT: &str = "mm/dd/yyyy";

/// Union of row headers in first-seen order; used when a sheet does not carry
/// an explicit header order.
fn collect_headers(rows: &[ReportRow]) -> Vec<String> {
    let mut headers: Vec<String> = Vec::new();
    for row in rows {
        for header in row.headers() {
            if !headers.iter().any(|h| h == header) {
                headers.push(header.to_string());
            }
        }
    }
    headers
}

/// Assembles one named worksheet per sheet. Numeric and date cells keep their
/// types; explicit header ordering is honored when supplied.
pub fn assemble(sheets: &[Sheet]) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let date_format = Format::new().set_num_format(DATE_NUM_FORMAT);

    for sheet in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&sheet.name)?;

        let headers = match &sheet.header_order {
            Some(order) => order.clone(),
            None => collect_headers(&sheet.rows),
        };

        for (col, header) in headers.iter().enumerate() {
            worksheet.write_string(0, col as u16, header)?;
        }

        for (row_idx, row) in sheet.rows.iter().enumerate() {
            let excel_row = (row_idx + 1) as u32;
            for (col, header) in headers.iter().enumerate() {
                let col = col as u16;
                match row.get(header) {
                    Some(CellValue::Text(s)) => {
                        worksheet.write_string(excel_row, col, s)?;
                    }
                    Some(CellValue::Number(n)) => {
                        worksheet.write_number(excel_row, col, *n)?;
                    }
                    Some(CellValue::Date(d)) => {
                        worksheet.write_datetime_with_format(excel_row, col, d, &date_format)?;
                    }
                    None => {}
                }
            }
        }
    }

    workbook.save_to_buffer()
}
