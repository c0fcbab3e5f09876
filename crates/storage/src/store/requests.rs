#![forbid(unsafe_code)]

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateCollectionRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditCollectionRequest {
    pub collection_id: String,
    pub name: Option<String>,
    /// `Some(None)` clears the description; `None` leaves it unchanged.
    pub description: Option<Option<String>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeleteCollectionRequest {
    pub collection_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListCollectionsRequest {
    pub limit: usize,
    pub offset: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatePlantRequest {
    pub collection_id: String,
    pub name: String,
    pub species: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddImageRequest {
    pub plant_id: String,
    pub url: String,
    pub is_main: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetMainImageRequest {
    pub plant_id: String,
    pub image_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListPlantsRequest {
    pub collection_id: String,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddPlantRequest {
    pub collection_id: String,
    pub plant_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemovePlantRequest {
    pub collection_id: String,
    pub plant_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetThumbnailRequest {
    pub collection_id: String,
    /// `None` clears the thumbnail.
    pub image_id: Option<String>,
}
