use gloo_net::http::{Request, Response};
use protocol::{
    ErrorResponse, FilterSelection, GENERATE_MAP_PATH, GenerateMapResponse, RESET_MAPS_PATH,
    ResetMapsResponse,
};

pub async fn generate_map(selection: &FilterSelection) -> Result<GenerateMapResponse, String> {
    let resp = Request::post(GENERATE_MAP_PATH)
        .json(selection)
        .map_err(|e| e.to_string())?
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if !resp.ok() {
        return Err(error_message(resp).await);
    }
    resp.json::<GenerateMapResponse>()
        .await
        .map_err(|e| e.to_string())
}

pub async fn reset_maps() -> Result<ResetMapsResponse, String> {
    let resp = Request::delete(RESET_MAPS_PATH)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if !resp.ok() {
        return Err(error_message(resp).await);
    }
    resp.json::<ResetMapsResponse>()
        .await
        .map_err(|e| e.to_string())
}

/// Prefers the server's message; falls back to the bare status.
async fn error_message(resp: Response) -> String {
    let status = resp.status();
    match resp.json::<ErrorResponse>().await {
        Ok(body) if !body.error.is_empty() => body.error,
        _ => format!("HTTP error! status: {status}"),
    }
}
