use crate::control::{success, ControllerError, ManageAccess, Response};
use crate::export::{export_filename, DetailSource, Exporter};
use actix_web::http::header::{self, ContentDisposition, DispositionParam, DispositionType};
use actix_web::{
    post,
    web::{Data, Json},
    HttpResponse,
};
use ph_types::catalog::EntityId;
use ph_types::record::ProductRecord;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Serialize)]
pub struct IdList {
    pub ids: Vec<EntityId>,
    pub count: usize,
}

#[post("/export/ids")]
pub async fn list_ids(exporter: Data<Arc<Exporter>>, _access: ManageAccess) -> Response {
    let ids = exporter.collect_ids().await?;
    Ok(success(IdList {
        count: ids.len(),
        ids,
    }))
}

#[derive(Deserialize)]
pub struct DetailsDto {
    #[serde(default)]
    pub ids: Vec<EntityId>,
}

#[derive(Serialize)]
pub struct RecordList {
    pub records: Vec<ProductRecord>,
}

#[post("/export/details")]
pub async fn fetch_details(
    exporter: Data<Arc<Exporter>>,
    dto: Json<DetailsDto>,
    _access: ManageAccess,
) -> Response {
    if dto.ids.is_empty() {
        return Err(ControllerError::NoData(
            "No product IDs provided".to_string(),
        ));
    }
    let records = exporter.fetch_details(&dto.ids).await?;
    Ok(success(RecordList { records }))
}

#[derive(Deserialize)]
pub struct CsvDto {
    pub records: Option<Vec<ProductRecord>>,
}

#[post("/export/csv")]
pub async fn download_csv(dto: Json<CsvDto>, _access: ManageAccess) -> Response {
    let records = dto
        .into_inner()
        .records
        .ok_or_else(|| ControllerError::NoData("No products data provided".to_string()))?;
    let body = crate::csv::write_records(&records)?;
    let filename = export_filename(OffsetDateTime::now_utc())?;
    log::info!("Exporting {} records as {filename}", records.len());
    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(filename)],
        })
        .insert_header((header::PRAGMA, "public"))
        .insert_header((header::CACHE_CONTROL, "must-revalidate"))
        .body(body))
}
