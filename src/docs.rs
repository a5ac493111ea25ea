use utoipa::OpenApi;
use crate::{devices, events, handlers};

#[derive(OpenApi)]
#[openapi(
    paths(handlers::post_request, handlers::get_devices),
    components(
        schemas(events::Message, devices::DeviceInfo, devices::DeviceType)
    )
)]
pub struct ApiDoc;
