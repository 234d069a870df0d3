use boq_core::{
    read_table_path, ExtractedItem, ItemMetadata, MetadataCache, Quantity, DESCRIPTION_COLUMN,
};
use rust_xlsxwriter::Workbook;

#[test]
fn workbook_rows_flow_into_the_metadata_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("BOQ.XLSX");
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "Item").unwrap();
    sheet.write_string(0, 1, "Description").unwrap();
    sheet.write_string(0, 2, "Qty").unwrap();
    sheet.write_number(1, 0, 1).unwrap();
    sheet.write_string(1, 1, "10m copper wire").unwrap();
    sheet.write_number(1, 2, 10).unwrap();
    sheet.write_number(2, 0, 2).unwrap();
    sheet.write_string(2, 1, "5 switches").unwrap();
    workbook.save(&path).unwrap();

    let table = read_table_path(&path).unwrap();
    let rows = table.source_rows(DESCRIPTION_COLUMN).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].text, "5 switches");
    assert_eq!(
        table.concatenated_rows(),
        vec!["1 10m copper wire 10", "2 5 switches"]
    );

    let records: Vec<ItemMetadata> = rows
        .iter()
        .map(|row| {
            ItemMetadata::for_item(&row.text, &ExtractedItem::new(row.text.clone(), 1.0))
        })
        .collect();
    let cache = MetadataCache::in_dir(&dir.path().join("outputs"));
    cache.write_all(&records).unwrap();

    let reloaded = cache.load().unwrap();
    assert_eq!(reloaded, records);
    assert_eq!(reloaded[0].quantity, Some(Quantity::Number(1.0)));
}
