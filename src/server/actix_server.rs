//! Implementation of the actix server.

use actix_web::{
    delete, get,
    middleware::Logger,
    post,
    web::{self, Bytes, Data, Json, Path},
    App, HttpRequest, HttpResponse, HttpServer, Responder,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{Args, WebServerData};
use crate::{
    common::worker_version,
    err::ApiError,
    geno::reference::normalize_patient,
    matching::{
        federation::{complete_async, external_match, AsyncCompletion, AsyncError, ExternalMatch},
        internal_match, metrics,
    },
    model::{
        records::{Client, MatchResponse, MatchResult, MatchType},
        validate::{parse_match_request, validate_results},
        Patient, MME_ACCEPTED, MME_MIME_TYPE,
    },
    store::{MatchFilter, PatientFilter, UpsertOutcome},
};

/// Header carrying the client token.
pub const HEADER_AUTH_TOKEN: &str = "X-Auth-Token";

/// Maximal size of request bodies.
const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Resolve the client of the request from its token.
fn authorize(data: &WebServerData, req: &HttpRequest) -> Result<Client, ApiError> {
    let Some(token) = req
        .headers()
        .get(HEADER_AUTH_TOKEN)
        .and_then(|value| value.to_str().ok())
    else {
        warn!("request to {} without auth token", req.path());
        return Err(ApiError::Unauthorized);
    };
    match data.store.client_by_token(token)? {
        Some(client) => Ok(client),
        None => {
            warn!("request to {} with unknown auth token", req.path());
            Err(ApiError::Unauthorized)
        }
    }
}

/// Response carrying a message.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
struct Message {
    message: String,
}

impl Message {
    fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Add or update a patient, then match it against the peer nodes.
#[post("/patient/add")]
async fn add_patient(
    data: Data<WebServerData>,
    req: HttpRequest,
    body: Bytes,
) -> actix_web::Result<impl Responder, ApiError> {
    let client = authorize(&data, &req)?;
    let mut patient = parse_match_request(&body)?;
    info!("client {} submits patient {}", &client.id, &patient.id);

    normalize_patient(data.reference.as_ref(), &mut patient, data.normalize_options()).await;
    let message = match data.store.upsert_patient(&patient)? {
        UpsertOutcome::Inserted => "Patient was successfully inserted into database.",
        UpsertOutcome::Updated => "Patient was successfully updated.",
        UpsertOutcome::Unchanged => "Database content is unchanged.",
    };

    if !data.store.nodes()?.is_empty() {
        if let Err(e) = external_match(
            data.store.as_ref(),
            data.peers.as_ref(),
            &data.conf,
            &patient,
            None,
        )
        .await
        {
            warn!("external match of patient {} failed: {}", &patient.id, e);
        }
    }

    Ok(Json(message))
}

/// Delete a patient and the matches it triggered.
#[delete("/patient/delete/{patient_id}")]
async fn delete_patient(
    data: Data<WebServerData>,
    req: HttpRequest,
    path: Path<String>,
) -> actix_web::Result<impl Responder, ApiError> {
    let client = authorize(&data, &req)?;
    let patient_id = path.into_inner();
    info!("client {} removes patient {}", &client.id, &patient_id);

    let deleted = data.store.delete_matches(&MatchFilter {
        query_patient_id: Some(patient_id.clone()),
        ..Default::default()
    })?;
    info!("deleted {} match(es) triggered by patient {}", deleted, &patient_id);

    let message = if data.store.delete_patient(&patient_id)? {
        "Patient and its matches were successfully deleted from database".to_string()
    } else {
        format!(
            "ERROR. Could not delete a patient with ID {} from database",
            &patient_id
        )
    };
    Ok(Json(Message::new(message)))
}

/// List all patients.
#[get("/patient/view")]
async fn view_patients(
    data: Data<WebServerData>,
    req: HttpRequest,
) -> actix_web::Result<impl Responder, ApiError> {
    let client = authorize(&data, &req)?;
    info!("client {} views all patients", &client.id);

    Ok(Json(
        data.store
            .find_patients(&PatientFilter::All)?
            .iter()
            .map(Patient::to_mme)
            .collect::<Vec<_>>(),
    ))
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
struct Heartbeat {
    production: bool,
    version: String,
    accept: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
struct HeartbeatResponse {
    heartbeat: Heartbeat,
    disclaimer: String,
}

#[get("/heartbeat")]
async fn heartbeat(
    data: Data<WebServerData>,
    req: HttpRequest,
) -> actix_web::Result<impl Responder, ApiError> {
    authorize(&data, &req)?;
    Ok(Json(HeartbeatResponse {
        heartbeat: Heartbeat {
            production: data.conf.production,
            version: worker_version().to_string(),
            accept: MME_ACCEPTED.iter().map(|s| s.to_string()).collect(),
        },
        disclaimer: data.conf.disclaimer.clone(),
    }))
}

#[derive(Serialize, Debug, Clone)]
struct MetricsResponse {
    metrics: metrics::Metrics,
    disclaimer: String,
}

#[get("/metrics")]
async fn node_metrics(data: Data<WebServerData>) -> actix_web::Result<impl Responder, ApiError> {
    Ok(Json(MetricsResponse {
        metrics: metrics::compute(data.store.as_ref())?,
        disclaimer: data.conf.disclaimer.clone(),
    }))
}

#[derive(Serialize, Debug, Clone)]
struct NodeDescription {
    id: String,
    description: String,
}

/// List the peer nodes.
#[get("/nodes")]
async fn nodes(
    data: Data<WebServerData>,
    req: HttpRequest,
) -> actix_web::Result<impl Responder, ApiError> {
    authorize(&data, &req)?;
    Ok(Json(
        data.store
            .nodes()?
            .into_iter()
            .map(|node| NodeDescription {
                id: node.id,
                description: node.label,
            })
            .collect::<Vec<_>>(),
    ))
}

/// Query parameters of `/matches/{patient_id}`.
#[derive(Deserialize, Debug, Clone)]
struct MatchesQuery {
    #[serde(rename = "type")]
    match_type: Option<MatchType>,
    #[serde(default = "_default_with_results")]
    with_results: bool,
}

/// Return default of `MatchesQuery::with_results`.
fn _default_with_results() -> bool {
    true
}

/// List the match records involving a patient.
#[get("/matches/{patient_id}")]
async fn patient_matches(
    data: Data<WebServerData>,
    req: HttpRequest,
    path: Path<String>,
    query: web::Query<MatchesQuery>,
) -> actix_web::Result<HttpResponse, ApiError> {
    authorize(&data, &req)?;
    let patient_id = path.into_inner();

    let records = data.store.find_matches(&MatchFilter {
        involved_patient_id: Some(patient_id.clone()),
        match_types: query.match_type.into_iter().collect(),
        with_results: query.with_results,
        ..Default::default()
    })?;
    if records.is_empty() {
        Ok(HttpResponse::Ok().json(format!(
            "Could not find any matches in database for patient ID {}",
            &patient_id
        )))
    } else {
        Ok(HttpResponse::Ok().json(serde_json::json!({ "results": records })))
    }
}

/// Match a patient against the local patients.
#[post("/match")]
async fn match_internal(
    data: Data<WebServerData>,
    req: HttpRequest,
    body: Bytes,
) -> actix_web::Result<HttpResponse, ApiError> {
    let client = authorize(&data, &req)?;
    let mut patient = parse_match_request(&body)?;
    info!("client {} matches patient {}", &client.id, &patient.id);

    normalize_patient(data.reference.as_ref(), &mut patient, data.normalize_options()).await;
    let record = {
        let data = data.clone();
        web::block(move || {
            internal_match(&data.ctx, data.store.as_ref(), &data.conf, &patient)
        })
        .await
        .map_err(|e| anyhow::anyhow!("matching was aborted: {}", e))??
    };

    let results = record.result_patients().cloned().collect::<Vec<MatchResult>>();
    validate_results(&results)?;
    let response = MatchResponse {
        results,
        disclaimer: Some(data.conf.disclaimer.clone()),
    };
    let body = serde_json::to_string(&response).map_err(|e| ApiError::Internal(e.into()))?;
    Ok(HttpResponse::Ok().content_type(MME_MIME_TYPE).body(body))
}

/// Query parameters of `/match/external/{patient_id}`.
#[derive(Deserialize, Debug, Clone)]
struct ExternalQuery {
    node: Option<String>,
}

/// Match a stored patient against the peer nodes.
#[post("/match/external/{patient_id}")]
async fn match_external(
    data: Data<WebServerData>,
    req: HttpRequest,
    path: Path<String>,
    query: web::Query<ExternalQuery>,
) -> actix_web::Result<HttpResponse, ApiError> {
    let client = authorize(&data, &req)?;
    let patient_id = path.into_inner();
    info!(
        "client {} matches patient {} against peer nodes",
        &client.id, &patient_id
    );

    let Some(patient) = data.store.get_patient(&patient_id)? else {
        return Ok(HttpResponse::Ok().json(Message::new(format!(
            "ERROR. Could not find any patient with ID {} in database",
            &patient_id
        ))));
    };
    match external_match(
        data.store.as_ref(),
        data.peers.as_ref(),
        &data.conf,
        &patient,
        query.node.as_deref(),
    )
    .await?
    {
        ExternalMatch::NoPeers => {
            let message = match query.node.as_ref() {
                Some(node) => format!(
                    "ERROR. Could not find any connected node with id {} in database",
                    node
                ),
                None => "Could not find any other node connected to this MatchMaker server"
                    .to_string(),
            };
            Ok(HttpResponse::Ok().json(Message::new(message)))
        }
        ExternalMatch::Completed(record) => Ok(HttpResponse::Ok().json(record)),
    }
}

/// Receive the results of a query a peer has deferred.
#[post("/async_response")]
async fn async_response(
    data: Data<WebServerData>,
    body: Bytes,
) -> actix_web::Result<impl Responder, ApiError> {
    match complete_async(data.store.as_ref(), &body) {
        Ok(AsyncCompletion::Stored(record)) => {
            info!(
                "stored {} async result(s) for patient {}",
                record.result_patients().count(),
                &record.query_patient_id
            );
            Ok(Json(Message::new("results received, many thanks!")))
        }
        Ok(AsyncCompletion::UnknownPatient(_)) => Ok(Json(Message::new(
            "Error: could not create a valid match object from request data",
        ))),
        Err(e) => {
            warn!("rejecting async response: {}", &e);
            Err(match e {
                AsyncError::BadRequest(_) => ApiError::BadRequest,
                AsyncError::UnknownQueryId(_) => ApiError::Unauthorized,
                AsyncError::Invalid(_) => ApiError::Unprocessable,
                AsyncError::Store(e) => ApiError::Internal(e),
            })
        }
    }
}

/// Register the endpoints.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::PayloadConfig::new(MAX_PAYLOAD_SIZE))
        .service(add_patient)
        .service(delete_patient)
        .service(view_patients)
        .service(heartbeat)
        .service(node_metrics)
        .service(nodes)
        .service(patient_matches)
        .service(match_internal)
        .service(match_external)
        .service(async_response);
}

#[actix_web::main]
pub async fn main(args: &Args, data: Data<WebServerData>) -> std::io::Result<()> {
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .configure(configure)
            .wrap(Logger::default())
    })
    .bind((args.listen_host.as_str(), args.listen_port))?
    .run()
    .await
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use actix_web::{http::StatusCode, test};
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        conf::test::conf,
        geno::reference::test::static_reference,
        matching::federation::test::{result, Behaviour, FakePeers},
        model::{
            records::{NodeRef, PendingAsyncQuery},
            test::patient,
        },
        pheno::test::context,
        store::{
            test::{client, peer},
            MemoryStore, Store,
        },
    };

    const TOKEN: &str = "secret";

    fn web_data(store: MemoryStore, peers: FakePeers) -> Result<Data<WebServerData>, anyhow::Error> {
        store.upsert_client(&client("c1", TOKEN))?;
        Ok(Data::new(WebServerData {
            conf: crate::conf::Conf {
                resolve_genes: true,
                ..conf()
            },
            ctx: context()?,
            store: Box::new(store),
            reference: Box::new(static_reference()),
            peers: Box::new(peers),
        }))
    }

    fn add_body(p: &Patient) -> String {
        serde_json::json!({ "patient": p }).to_string()
    }

    #[actix_web::test]
    async fn heartbeat_and_nodes() -> Result<(), anyhow::Error> {
        let store = MemoryStore::new();
        store.upsert_node(&peer("a"))?;
        let data = web_data(store, FakePeers::default())?;
        let app = test::init_service(App::new().app_data(data).configure(configure)).await;

        for uri in ["/heartbeat", "/nodes"] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }

        let req = test::TestRequest::get()
            .uri("/heartbeat")
            .insert_header((HEADER_AUTH_TOKEN, TOKEN))
            .to_request();
        let resp: HeartbeatResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(
            resp,
            HeartbeatResponse {
                heartbeat: Heartbeat {
                    production: false,
                    version: "x.y.z".into(),
                    accept: vec![
                        "application/vnd.ga4gh.matchmaker.v1.0+json".into(),
                        "application/vnd.ga4gh.matchmaker.v1.1+json".into(),
                    ],
                },
                disclaimer: "test disclaimer".into(),
            }
        );

        let req = test::TestRequest::get()
            .uri("/nodes")
            .insert_header((HEADER_AUTH_TOKEN, TOKEN))
            .to_request();
        let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(
            resp,
            serde_json::json!([{"id": "a", "description": "Peer a"}])
        );

        Ok(())
    }

    #[actix_web::test]
    async fn add_patient_status_codes() -> Result<(), anyhow::Error> {
        let data = web_data(MemoryStore::new(), FakePeers::default())?;
        let app =
            test::init_service(App::new().app_data(data.clone()).configure(configure)).await;
        let body = add_body(&patient("P1", &["HP:0001263"], &["KARS"]));

        let req = test::TestRequest::post()
            .uri("/patient/add")
            .set_payload(body.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let message: String = test::read_body_json(resp).await;
        assert_eq!(message, "Not authorized");

        let req = test::TestRequest::post()
            .uri("/patient/add")
            .insert_header((HEADER_AUTH_TOKEN, "wrong"))
            .set_payload(body.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/patient/add")
            .insert_header((HEADER_AUTH_TOKEN, TOKEN))
            .set_payload("{'_id': 'patient_id' }")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let message: String = test::read_body_json(resp).await;
        assert_eq!(message, "Invalid request JSON");

        let req = test::TestRequest::post()
            .uri("/patient/add")
            .insert_header((HEADER_AUTH_TOKEN, TOKEN))
            .set_payload(r#"{"id": "P1"}"#)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let message: String = test::read_body_json(resp).await;
        assert_eq!(message, "Request does not conform to API specifications");

        Ok(())
    }

    #[actix_web::test]
    async fn add_update_delete_patient() -> Result<(), anyhow::Error> {
        let data = web_data(MemoryStore::new(), FakePeers::default())?;
        let app =
            test::init_service(App::new().app_data(data.clone()).configure(configure)).await;
        let mut p1 = patient("P1", &["HP:0001263"], &["KARS"]);
        p1.contact.href = "contact@example.com".into();

        let mut messages = Vec::new();
        for label in ["first", "first", "second"] {
            p1.label = Some(label.into());
            let req = test::TestRequest::post()
                .uri("/patient/add")
                .insert_header((HEADER_AUTH_TOKEN, TOKEN))
                .set_payload(add_body(&p1))
                .to_request();
            let message: String = test::call_and_read_body_json(&app, req).await;
            messages.push(message);
        }
        assert_eq!(
            messages,
            vec![
                "Patient was successfully inserted into database.",
                "Database content is unchanged.",
                "Patient was successfully updated.",
            ]
        );

        let stored = data.store.get_patient("P1")?.expect("stored patient");
        assert_eq!(stored.contact.href, "mailto:contact@example.com");
        let gene = stored.genomic_features()[0].gene().expect("gene").clone();
        assert_eq!(gene.id, "ENSG00000065427");
        assert_eq!(gene.symbol.as_deref(), Some("KARS"));

        let req = test::TestRequest::get()
            .uri("/patient/view")
            .insert_header((HEADER_AUTH_TOKEN, TOKEN))
            .to_request();
        let patients: Vec<Patient> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(patients.len(), 1);

        let mut messages = Vec::new();
        for _ in 0..2 {
            let req = test::TestRequest::delete()
                .uri("/patient/delete/P1")
                .insert_header((HEADER_AUTH_TOKEN, TOKEN))
                .to_request();
            let message: Message = test::call_and_read_body_json(&app, req).await;
            messages.push(message.message);
        }
        assert_eq!(
            messages,
            vec![
                "Patient and its matches were successfully deleted from database",
                "ERROR. Could not delete a patient with ID P1 from database",
            ]
        );

        Ok(())
    }

    #[actix_web::test]
    async fn add_patient_triggers_external_match() -> Result<(), anyhow::Error> {
        let store = MemoryStore::new();
        store.upsert_node(&peer("a"))?;
        let peers = FakePeers(HashMap::from([(
            "a".to_string(),
            Behaviour::Results(vec![result("R1", 0.6)]),
        )]));
        let data = web_data(store, peers)?;
        let app =
            test::init_service(App::new().app_data(data.clone()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/patient/add")
            .insert_header((HEADER_AUTH_TOKEN, TOKEN))
            .set_payload(add_body(&patient("P1", &["HP:0001263"], &[])))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let records = data.store.find_matches(&MatchFilter::default())?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].match_type, MatchType::External);
        assert_eq!(records[0].query_patient_id, "P1");

        let req = test::TestRequest::get()
            .uri("/matches/P1?type=external")
            .insert_header((HEADER_AUTH_TOKEN, TOKEN))
            .to_request();
        let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp["results"].as_array().map(Vec::len), Some(1));

        let req = test::TestRequest::get()
            .uri("/matches/P1?type=internal")
            .insert_header((HEADER_AUTH_TOKEN, TOKEN))
            .to_request();
        let resp: String = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp, "Could not find any matches in database for patient ID P1");

        Ok(())
    }

    #[actix_web::test]
    async fn match_internal_ranks_results() -> Result<(), anyhow::Error> {
        let store = MemoryStore::new();
        store.upsert_patient(&patient("A", &["HP:0001263"], &["ENSG00000065427"]))?;
        store.upsert_patient(&patient("B", &["HP:0000006"], &["TP53"]))?;
        let data = web_data(store, FakePeers::default())?;
        let app =
            test::init_service(App::new().app_data(data.clone()).configure(configure)).await;

        let query = patient("Q", &["HP:0001263", "HP:0000252"], &["KARS"]);
        let req = test::TestRequest::post()
            .uri("/match")
            .insert_header((HEADER_AUTH_TOKEN, TOKEN))
            .set_payload(add_body(&query))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()
                .get(actix_web::http::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok()),
            Some(MME_MIME_TYPE)
        );
        let response: MatchResponse = test::read_body_json(resp).await;
        assert_eq!(
            response
                .results
                .iter()
                .map(|result| result.patient.id.as_str())
                .collect::<Vec<_>>(),
            vec!["A", "B"]
        );
        assert_eq!(response.disclaimer.as_deref(), Some("test disclaimer"));
        assert!(response.results[0].score.genotype > 0.0);

        // the query is not stored but the match is
        assert!(data.store.get_patient("Q")?.is_none());
        let req = test::TestRequest::get()
            .uri("/matches/A")
            .insert_header((HEADER_AUTH_TOKEN, TOKEN))
            .to_request();
        let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp["results"][0]["matchType"], "internal");

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp["metrics"]["numberOfCases"], 2);
        assert_eq!(resp["metrics"]["numberOfRequestsReceived"], 1);
        assert_eq!(resp["metrics"]["numberOfPotentialMatchesSent"], 1);
        assert_eq!(resp["disclaimer"], "test disclaimer");

        Ok(())
    }

    #[actix_web::test]
    async fn match_external_messages() -> Result<(), anyhow::Error> {
        let store = MemoryStore::new();
        store.upsert_patient(&patient("P1", &["HP:0001263"], &[]))?;
        let data = web_data(store, FakePeers::default())?;
        let app =
            test::init_service(App::new().app_data(data.clone()).configure(configure)).await;

        let mut messages = Vec::new();
        for uri in ["/match/external/unknown", "/match/external/P1"] {
            let req = test::TestRequest::post()
                .uri(uri)
                .insert_header((HEADER_AUTH_TOKEN, TOKEN))
                .to_request();
            let message: Message = test::call_and_read_body_json(&app, req).await;
            messages.push(message.message);
        }
        data.store.upsert_node(&peer("a"))?;
        let req = test::TestRequest::post()
            .uri("/match/external/P1?node=meh")
            .insert_header((HEADER_AUTH_TOKEN, TOKEN))
            .to_request();
        let message: Message = test::call_and_read_body_json(&app, req).await;
        messages.push(message.message);

        assert_eq!(
            messages,
            vec![
                "ERROR. Could not find any patient with ID unknown in database",
                "Could not find any other node connected to this MatchMaker server",
                "ERROR. Could not find any connected node with id meh in database",
            ]
        );

        // the fake peer `a` is unknown to the client and fails
        let req = test::TestRequest::post()
            .uri("/match/external/P1?node=a")
            .insert_header((HEADER_AUTH_TOKEN, TOKEN))
            .to_request();
        let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp["errors"].as_array().map(Vec::len), Some(1));

        Ok(())
    }

    #[actix_web::test]
    async fn async_response_status_codes() -> Result<(), anyhow::Error> {
        let store = MemoryStore::new();
        store.upsert_patient(&patient("Q", &["HP:0001263"], &[]))?;
        store.insert_pending(&PendingAsyncQuery {
            query_id: "q-1".into(),
            query_patient_id: "Q".into(),
            node: NodeRef::new("a".into(), "Peer a".into()),
            created: Utc::now(),
        })?;
        let data = web_data(store, FakePeers::default())?;
        let app =
            test::init_service(App::new().app_data(data.clone()).configure(configure)).await;
        let valid = serde_json::json!({
            "query_id": "q-1",
            "source": "fakey node",
            "response": {"results": [result("R1", 0.8)]},
        })
        .to_string();

        let cases = vec![
            (String::new(), StatusCode::BAD_REQUEST),
            (r#"{"key1": "value1"}"#.to_string(), StatusCode::UNAUTHORIZED),
            (
                r#"{"query_id": "q-1", "source": "fakey node"}"#.to_string(),
                StatusCode::BAD_REQUEST,
            ),
            (
                r#"{"query_id": "q-1", "response": {"results": ["malformed"]}}"#.to_string(),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (valid.clone(), StatusCode::OK),
            (valid, StatusCode::UNAUTHORIZED),
        ];
        for (body, expected) in cases {
            let req = test::TestRequest::post()
                .uri("/async_response")
                .set_payload(body.clone())
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), expected, "{}", body);
        }

        let records = data.store.find_matches(&MatchFilter::default())?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].match_type, MatchType::ExternalAsync);

        Ok(())
    }
}
