//! OpenAPI documentation configuration
//!
//! Generates the OpenAPI 3 document served under `/docs`.

use utoipa::OpenApi;

use crate::handlers::{
    HealthResponse, ImplantResponse, ReadyResponse, SubmissionResponse, SubmissionResult,
    WebhookRequest,
};
use crate::pipeline::{IngestResponse, RankedMatch};

/// Raiox API - OpenAPI Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Raiox - Implant Identification API",
        version = "0.1.0",
        description = r#"
## X-ray implant identification by embedding similarity

Submit a dental X-ray and get back the catalog implants it most resembles.

1. Send the image by URL via `POST /webhook`, or as a file via `POST /upload`
2. The image is embedded into a 512-dimensional unit vector
3. The catalog is ranked by cosine similarity and the best matches are recorded
4. The image, its vector and its ranked results are written atomically

Similarity is cosine similarity in percent: 100 for an identical direction,
0 for orthogonal, -100 for opposite.
"#,
        license(name = "MIT OR Apache-2.0")
    ),
    servers(
        (url = "http://localhost:8000", description = "Local development server")
    ),
    tags(
        (name = "Ingestion", description = "Submit X-ray images for identification"),
        (name = "Catalog", description = "Read the reference implant catalog"),
        (name = "Submissions", description = "Read recorded submissions and their matches"),
        (name = "Health", description = "Service health and readiness endpoints")
    ),
    paths(
        crate::handlers::health::health,
        crate::handlers::health::ready,
        crate::handlers::ingest::webhook_handler,
        crate::handlers::ingest::upload_handler,
        crate::handlers::implants::list_implants_handler,
        crate::handlers::implants::get_implant_handler,
        crate::handlers::submissions::get_submission_handler,
    ),
    components(
        schemas(
            HealthResponse,
            ReadyResponse,
            WebhookRequest,
            IngestResponse,
            RankedMatch,
            ImplantResponse,
            SubmissionResponse,
            SubmissionResult,
        )
    )
)]
pub struct ApiDoc;
