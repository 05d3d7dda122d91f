use anyhow::Context;
use ph_types::record::ProductRecord;
use rust_decimal::Decimal;

/// UTF-8 byte order mark, spreadsheet applications need it to pick the encoding.
pub const BOM: &[u8] = b"\xEF\xBB\xBF";

pub const HEADER: [&str; 5] = ["ID", "Title", "Permalink", "Current Price", "Lowest Price"];

fn format_price(price: Decimal) -> String {
    price.normalize().to_string()
}

pub fn write_records(records: &[ProductRecord]) -> Result<Vec<u8>, anyhow::Error> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(BOM.to_vec());
    writer.write_record(HEADER)?;
    for r in records {
        writer
            .write_record([
                r.id.to_string(),
                r.title.clone(),
                r.permalink.clone(),
                format_price(r.current_price),
                format_price(r.lowest_price),
            ])
            .with_context(|| format!("Unable to write record {}", r.id))?;
    }
    writer
        .into_inner()
        .map_err(|err| anyhow::anyhow!("Unable to flush csv writer: {}", err.error()))
}

#[cfg(test)]
pub mod test {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn writes_header_only_for_empty_export() {
        let bytes = write_records(&[]).unwrap();
        assert_eq!(
            "\u{feff}ID,Title,Permalink,Current Price,Lowest Price\n",
            String::from_utf8(bytes).unwrap()
        );
    }

    #[test]
    fn quotes_fields_and_reads_back() {
        let record = ProductRecord {
            id: 42,
            title: r#"Shirt, "Deluxe""#.to_string(),
            permalink: "https://shop.test/product/shirt/".to_string(),
            current_price: dec!(19.90),
            lowest_price: dec!(0),
        };
        let bytes = write_records(&[record.clone()]).unwrap();
        assert!(bytes.starts_with(BOM));

        let mut reader = csv::Reader::from_reader(&bytes[BOM.len()..]);
        assert_eq!(
            HEADER.to_vec(),
            reader.headers().unwrap().iter().collect::<Vec<_>>()
        );
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(
            vec!["42", r#"Shirt, "Deluxe""#, record.permalink.as_str(), "19.9", "0"],
            row.iter().collect::<Vec<_>>()
        );
    }
}
