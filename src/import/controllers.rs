use crate::control::{input, success, ControllerError, InputData, ManageAccess, Response};
use crate::import::Importer;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{
    get, post,
    web::{Data, Path},
    HttpResponse,
};
use ph_types::catalog::{CatalogRepository, EntityId};
use serde::{Deserialize, Serialize};
use serde_aux::field_attributes::deserialize_option_number_from_string;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct ImportDto {
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub target_product: Option<EntityId>,
    #[serde(default)]
    pub import_data: String,
}

#[post("/import")]
pub async fn import_history(
    importer: Data<Arc<Importer>>,
    dto: InputData<ImportDto>,
    _access: ManageAccess,
) -> Response {
    let ImportDto {
        target_product,
        import_data,
    } = input(dto);
    // The target is checked before the payload, empty data is rejected by the importer.
    let target = target_product
        .filter(|id| *id != 0)
        .ok_or_else(|| ControllerError::InvalidInput {
            field: "target_product".to_string(),
            msg: "Please select a target product".to_string(),
        })?;
    let summary = importer.import(target, &import_data).await?;
    log::info!("{}", summary.message);
    Ok(success(summary))
}

#[derive(Serialize)]
pub struct TargetProduct {
    pub id: EntityId,
    pub name: String,
}

/// Candidates for the import target picker.
#[get("/products")]
pub async fn target_products(
    catalog: Data<Arc<dyn CatalogRepository>>,
    _access: ManageAccess,
) -> Response {
    let products = catalog
        .published_products()
        .await?
        .into_iter()
        .map(|p| TargetProduct {
            id: p.id,
            name: p.name,
        })
        .collect::<Vec<_>>();
    Ok(success(products))
}

#[get("/history/{id}")]
pub async fn download_history(
    importer: Data<Arc<Importer>>,
    id: Path<EntityId>,
    _access: ManageAccess,
) -> Response {
    let id = id.into_inner();
    let file = importer.export_history(id).await?;
    Ok(HttpResponse::Ok()
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(format!(
                "price-history-{id}.json"
            ))],
        })
        .json(file))
}
