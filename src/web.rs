//! Debug dashboard (C13): node status plus an ad-hoc GET/PUT form.
//! Calls straight into an in-process [`Node`] instead of looping back
//! through gRPC. Gated behind `NodeConfig::dev_mode` and never reachable
//! from peer RPCs.

use crate::identifier::Identifier;
use crate::node::Node;
use crate::replica::DEFAULT_REPLICATION_COUNT;
use actix_web::web::Query;
use actix_web::{get, web, App, HttpResponse, HttpServer, Responder};
use serde::Deserialize;
use std::sync::Arc;
use tera::{Context, Tera};

#[derive(Deserialize)]
struct QueryParams {
    get_key: Option<String>,
    put_key: Option<String>,
    put_value: Option<String>,
}

fn key_from_string(s: &str) -> Identifier {
    Identifier::hash_of(s.as_bytes(), 256)
}

#[get("/")]
async fn index(node: web::Data<Arc<Node>>, query: Option<Query<QueryParams>>) -> impl Responder {
    let tera = match Tera::new("static/html/**/*") {
        Ok(t) => t,
        Err(e) => return HttpResponse::InternalServerError().body(format!("template error: {e}")),
    };
    let mut context = Context::new();
    context.insert("title", "Chord Node");
    context.insert("self_id", &node.id().to_string());
    context.insert("self_address", node.address());
    context.insert("predecessor", &node.predecessor().map(|p| format!("{} ({})", p.id, p.address)));
    context.insert(
        "successor_list",
        &node.successor_list_snapshot().iter().map(|n| format!("{} ({})", n.id, n.address)).collect::<Vec<_>>(),
    );
    context.insert(
        "fingers",
        &node
            .finger_table_snapshot()
            .iter()
            .map(|(start, succ)| (start.to_string(), succ.as_ref().map(|n| format!("{} ({})", n.id, n.address))))
            .collect::<Vec<_>>(),
    );

    if let Some(query) = query {
        if let Some(get_key) = &query.get_key {
            let key = key_from_string(get_key);
            let values = node.get(key, DEFAULT_REPLICATION_COUNT).await;
            context.insert("get_result", &values.into_iter().map(|v| String::from_utf8_lossy(&v).into_owned()).collect::<Vec<_>>());
        }
        if let (Some(put_key), Some(put_value)) = (&query.put_key, &query.put_value) {
            let key = key_from_string(put_key);
            let outcome = node.put(key, put_value.clone().into_bytes(), 3600, DEFAULT_REPLICATION_COUNT).await;
            context.insert("put_result", &outcome.is_ok());
        }
    }

    match tera.render("index.html", &context) {
        Ok(body) => HttpResponse::Ok().content_type("text/html").body(body),
        Err(e) => HttpResponse::InternalServerError().body(format!("render error: {e}")),
    }
}

/// Runs the dashboard until the process stops; callers spawn this as its own task.
pub async fn serve(node: Arc<Node>, bind_address: String) -> std::io::Result<()> {
    HttpServer::new(move || App::new().app_data(web::Data::new(node.clone())).service(index))
        .bind(bind_address)?
        .run()
        .await
}
