//! Passerelle d'exécution des outils appelés par le modèle
//!
//! Le modèle peut demander deux actions applicatives en pleine conversation :
//! - `render_chart` : afficher un graphique construit à partir de ses arguments
//! - `navigate_app` : changer de vue dans l'application
//!
//! Les arguments JSON sont convertis en types validés (`RenderChartArgs`,
//! `NavigateArgs`) ; une erreur de validation produit une réponse `"error"`
//! sans jamais interrompre le lot d'appels.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use network::{FunctionCall, FunctionDeclaration, FunctionResponse};

pub const RENDER_CHART: &str = "render_chart";
pub const NAVIGATE_APP: &str = "navigate_app";

/// Erreurs de validation des arguments d'outil
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolArgsError {
    #[error("Arguments invalides: {0}")]
    Malformed(String),

    #[error("Type de graphique non supporté: {0}")]
    UnsupportedChartType(String),

    #[error("Champ requis manquant ou vide: {0}")]
    MissingField(&'static str),
}

/// Types de graphiques reconnus
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Area,
    Pie,
    Scatter,
    Composed,
}

impl ChartType {
    pub const ALL: [ChartType; 6] = [
        ChartType::Bar,
        ChartType::Line,
        ChartType::Area,
        ChartType::Pie,
        ChartType::Scatter,
        ChartType::Composed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Bar => "bar",
            ChartType::Line => "line",
            ChartType::Area => "area",
            ChartType::Pie => "pie",
            ChartType::Scatter => "scatter",
            ChartType::Composed => "composed",
        }
    }

    /// Analyse un type sans tenir compte de la casse
    pub fn parse(raw: &str) -> Result<Self, ToolArgsError> {
        let lowered = raw.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|chart_type| chart_type.as_str() == lowered)
            .ok_or(ToolArgsError::UnsupportedChartType(raw.to_string()))
    }
}

/// Série d'un graphique : clé de la colonne dans `data`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSeries {
    #[serde(alias = "key")]
    pub data_key: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Arguments bruts tels qu'envoyés par le modèle
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRenderChartArgs {
    #[serde(rename = "type")]
    chart_type: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    x_axis_label: Option<String>,
    #[serde(default)]
    y_axis_label: Option<String>,
    #[serde(default)]
    series: Option<Vec<ChartSeries>>,
    #[serde(default)]
    data: Option<Vec<Map<String, Value>>>,
}

/// Arguments validés de `render_chart`
#[derive(Clone, Debug, PartialEq)]
pub struct RenderChartArgs {
    pub chart_type: ChartType,
    pub title: String,
    pub summary: String,
    pub x_axis_label: Option<String>,
    pub y_axis_label: Option<String>,
    pub series: Vec<ChartSeries>,
    pub data: Vec<Map<String, Value>>,
}

impl RenderChartArgs {
    /// Analyse et valide les arguments JSON
    ///
    /// # Erreurs
    /// - `ToolArgsError::UnsupportedChartType` si `type` est inconnu
    /// - `ToolArgsError::MissingField` si `type`, `series` ou `data` manque ou est vide
    /// - `ToolArgsError::Malformed` si la structure JSON est incorrecte
    pub fn from_value(args: &Value) -> Result<Self, ToolArgsError> {
        let raw: RawRenderChartArgs =
            serde_json::from_value(args.clone()).map_err(|e| ToolArgsError::Malformed(e.to_string()))?;

        let chart_type = match raw.chart_type {
            Some(raw_type) => ChartType::parse(&raw_type)?,
            None => return Err(ToolArgsError::MissingField("type")),
        };

        let series = raw.series.filter(|s| !s.is_empty()).ok_or(ToolArgsError::MissingField("series"))?;
        let data = raw.data.filter(|d| !d.is_empty()).ok_or(ToolArgsError::MissingField("data"))?;

        if series.iter().any(|s| s.data_key.trim().is_empty()) {
            return Err(ToolArgsError::MissingField("series.dataKey"));
        }

        Ok(Self {
            chart_type,
            title: raw.title,
            summary: raw.summary,
            x_axis_label: raw.x_axis_label,
            y_axis_label: raw.y_axis_label,
            series,
            data,
        })
    }
}

/// Graphique prêt à être rendu par l'application
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfig {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    pub title: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_axis_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y_axis_label: Option<String>,
    pub series: Vec<ChartSeries>,
    pub data: Vec<Map<String, Value>>,
}

impl From<RenderChartArgs> for ChartConfig {
    fn from(args: RenderChartArgs) -> Self {
        Self {
            id: Uuid::new_v4(),
            chart_type: args.chart_type,
            title: args.title,
            summary: args.summary,
            x_axis_label: args.x_axis_label,
            y_axis_label: args.y_axis_label,
            series: args.series,
            data: args.data,
        }
    }
}

/// Arguments de `navigate_app`
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct NavigateArgs {
    #[serde(default)]
    pub view_id: Option<String>,
}

impl NavigateArgs {
    /// Arguments absents ou illisibles : pas de vue cible
    pub fn from_value(args: &Value) -> Self {
        match serde_json::from_value::<NavigateArgs>(args.clone()) {
            Ok(parsed) => Self {
                view_id: parsed.view_id.filter(|id| !id.trim().is_empty()),
            },
            Err(e) => {
                debug!(error = %e, "arguments navigate_app ignorés");
                Self::default()
            }
        }
    }
}

/// Statut renvoyé au modèle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
    /// Accusé de réception générique (outil inconnu)
    Ok,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Success => "success",
            ToolStatus::Error => "error",
            ToolStatus::Ok => "ok",
        }
    }
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Appel d'outil reçu du modèle
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub args: Value,
}

impl From<&FunctionCall> for ToolCallRequest {
    fn from(call: &FunctionCall) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            args: call.args.clone(),
        }
    }
}

/// Réponse renvoyée au modèle
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallResponse {
    pub id: String,
    pub name: String,
    pub status: ToolStatus,
    pub result: Value,
}

impl From<ToolCallResponse> for FunctionResponse {
    fn from(response: ToolCallResponse) -> Self {
        FunctionResponse {
            id: response.id,
            name: response.name,
            response: json!({
                "status": response.status.as_str(),
                "result": response.result,
            }),
        }
    }
}

/// Callback invoqué avec chaque graphique généré
pub type ChartCallback = Arc<dyn Fn(ChartConfig) + Send + Sync>;

/// Callback invoqué avec l'identifiant de la vue cible
pub type NavigateCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Exécute les appels d'outils et construit les réponses
#[derive(Clone)]
pub struct ToolDispatchGateway {
    on_chart_generated: ChartCallback,
    on_navigate: NavigateCallback,
}

impl ToolDispatchGateway {
    /// Crée la passerelle avec les callbacks de l'application
    ///
    /// # Example
    /// ```rust
    /// use assistant::{ToolCallRequest, ToolDispatchGateway, ToolStatus};
    /// use serde_json::json;
    ///
    /// let gateway = ToolDispatchGateway::new(
    ///     |chart| println!("Graphique {}", chart.title),
    ///     |view| println!("Vue {}", view),
    /// );
    ///
    /// let response = gateway.dispatch(&ToolCallRequest {
    ///     id: "1".into(),
    ///     name: "navigate_app".into(),
    ///     args: json!({"view_id": "dashboard"}),
    /// });
    /// assert_eq!(response.status, ToolStatus::Success);
    /// ```
    pub fn new<C, N>(on_chart_generated: C, on_navigate: N) -> Self
    where
        C: Fn(ChartConfig) + Send + Sync + 'static,
        N: Fn(String) + Send + Sync + 'static,
    {
        Self {
            on_chart_generated: Arc::new(on_chart_generated),
            on_navigate: Arc::new(on_navigate),
        }
    }

    /// Passerelle sans effet applicatif
    pub fn noop() -> Self {
        Self::new(|_| {}, |_| {})
    }

    /// Exécute un appel ; ne produit jamais d'erreur
    pub fn dispatch(&self, request: &ToolCallRequest) -> ToolCallResponse {
        let (status, result) = match request.name.as_str() {
            RENDER_CHART => self.render_chart(&request.args),
            NAVIGATE_APP => self.navigate_app(&request.args),
            other => {
                debug!(tool = other, "outil inconnu, accusé de réception");
                (ToolStatus::Ok, json!("acknowledged"))
            }
        };

        ToolCallResponse {
            id: request.id.clone(),
            name: request.name.clone(),
            status,
            result,
        }
    }

    /// Exécute un lot dans l'ordre, une réponse par appel
    pub fn dispatch_batch(&self, requests: &[ToolCallRequest]) -> Vec<ToolCallResponse> {
        requests.iter().map(|request| self.dispatch(request)).collect()
    }

    fn render_chart(&self, args: &Value) -> (ToolStatus, Value) {
        match RenderChartArgs::from_value(args) {
            Ok(parsed) => {
                let chart = ChartConfig::from(parsed);
                let chart_id = chart.id;
                info!(chart = %chart_id, kind = chart.chart_type.as_str(), title = %chart.title, "📊 graphique généré");
                (self.on_chart_generated)(chart);
                (
                    ToolStatus::Success,
                    json!({ "chartId": chart_id.to_string(), "message": "Graphique affiché" }),
                )
            }
            Err(e) => {
                warn!(error = %e, "render_chart refusé");
                (ToolStatus::Error, json!({ "error": e.to_string() }))
            }
        }
    }

    fn navigate_app(&self, args: &Value) -> (ToolStatus, Value) {
        match NavigateArgs::from_value(args).view_id {
            Some(view_id) => {
                info!(view = %view_id, "🧭 navigation");
                (self.on_navigate)(view_id.clone());
                (ToolStatus::Success, json!({ "viewId": view_id }))
            }
            None => (ToolStatus::Success, json!({ "message": "Aucune vue demandée" })),
        }
    }
}

impl fmt::Debug for ToolDispatchGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDispatchGateway").finish_non_exhaustive()
    }
}

/// Déclaration de `render_chart` envoyée au modèle
pub fn render_chart_declaration() -> FunctionDeclaration {
    let types: Vec<&str> = ChartType::ALL.iter().map(ChartType::as_str).collect();

    FunctionDeclaration {
        name: RENDER_CHART.to_string(),
        description: "Affiche un graphique dans l'application à partir de données tabulaires.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "type": { "type": "string", "enum": types, "description": "Type de graphique" },
                "title": { "type": "string" },
                "summary": { "type": "string", "description": "Une phrase résumant ce que montre le graphique" },
                "xAxisLabel": { "type": "string" },
                "yAxisLabel": { "type": "string" },
                "series": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "dataKey": { "type": "string" },
                            "name": { "type": "string" },
                            "color": { "type": "string" }
                        },
                        "required": ["dataKey"]
                    }
                },
                "data": {
                    "type": "array",
                    "description": "Lignes de données, une clé par série plus une étiquette",
                    "items": { "type": "object" }
                }
            },
            "required": ["type", "title", "summary", "series", "data"]
        }),
    }
}

/// Déclaration de `navigate_app` envoyée au modèle
pub fn navigate_app_declaration() -> FunctionDeclaration {
    FunctionDeclaration {
        name: NAVIGATE_APP.to_string(),
        description: "Ouvre une vue de l'application.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "view_id": { "type": "string", "description": "Identifiant de la vue à afficher" }
            },
            "required": ["view_id"]
        }),
    }
}

/// Catalogue des outils déclarés à l'ouverture de session
pub fn default_catalog() -> Vec<FunctionDeclaration> {
    vec![render_chart_declaration(), navigate_app_declaration()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        charts: Arc<Mutex<Vec<ChartConfig>>>,
        views: Arc<Mutex<Vec<String>>>,
        gateway: ToolDispatchGateway,
    }

    fn recorder() -> Recorder {
        let charts = Arc::new(Mutex::new(Vec::new()));
        let views = Arc::new(Mutex::new(Vec::new()));
        let (c, v) = (Arc::clone(&charts), Arc::clone(&views));
        let gateway = ToolDispatchGateway::new(
            move |chart| c.lock().unwrap().push(chart),
            move |view| v.lock().unwrap().push(view),
        );
        Recorder { charts, views, gateway }
    }

    fn call(name: &str, args: Value) -> ToolCallRequest {
        ToolCallRequest {
            id: format!("{}-id", name),
            name: name.to_string(),
            args,
        }
    }

    fn valid_chart_args(chart_type: &str) -> Value {
        json!({
            "type": chart_type,
            "title": "Ventes",
            "summary": "Ventes par trimestre",
            "series": [{ "dataKey": "revenue", "name": "Chiffre d'affaires" }],
            "data": [{ "label": "T1", "revenue": 12 }, { "label": "T2", "revenue": 18 }]
        })
    }

    #[test]
    fn test_render_chart_success() {
        let rec = recorder();
        let response = rec.gateway.dispatch(&call(RENDER_CHART, valid_chart_args("BAR")));

        assert_eq!(response.status, ToolStatus::Success);
        assert_eq!(response.id, "render_chart-id");

        let charts = rec.charts.lock().unwrap();
        assert_eq!(charts.len(), 1);
        assert_eq!(charts[0].chart_type, ChartType::Bar);
        assert_eq!(charts[0].data.len(), 2);
        assert_eq!(response.result["chartId"], charts[0].id.to_string());
    }

    #[test]
    fn test_render_chart_fresh_ids() {
        let rec = recorder();
        rec.gateway.dispatch(&call(RENDER_CHART, valid_chart_args("line")));
        rec.gateway.dispatch(&call(RENDER_CHART, valid_chart_args("line")));

        let charts = rec.charts.lock().unwrap();
        assert_ne!(charts[0].id, charts[1].id);
    }

    #[test]
    fn test_render_chart_accepts_short_series_key() {
        let rec = recorder();
        let args = json!({
            "type": "bar",
            "title": "T",
            "summary": "S",
            "series": [{ "key": "val1", "name": "A" }],
            "data": [{ "label": "Jan", "val1": 10 }]
        });

        let response = rec.gateway.dispatch(&call(RENDER_CHART, args));

        assert_eq!(response.status, ToolStatus::Success);
        let charts = rec.charts.lock().unwrap();
        assert_eq!(charts.len(), 1);
        assert_eq!(charts[0].chart_type.as_str(), "bar");
        assert_eq!(charts[0].series[0].data_key, "val1");
    }

    #[test]
    fn test_render_chart_unsupported_type() {
        let rec = recorder();
        let response = rec.gateway.dispatch(&call(RENDER_CHART, valid_chart_args("heatmap")));

        assert_eq!(response.status, ToolStatus::Error);
        assert!(response.result["error"].as_str().unwrap().contains("heatmap"));
        assert!(rec.charts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_render_chart_missing_series_or_data() {
        let rec = recorder();

        let mut args = valid_chart_args("pie");
        args.as_object_mut().unwrap().remove("series");
        assert_eq!(rec.gateway.dispatch(&call(RENDER_CHART, args)).status, ToolStatus::Error);

        let mut args = valid_chart_args("pie");
        args["data"] = json!([]);
        assert_eq!(rec.gateway.dispatch(&call(RENDER_CHART, args)).status, ToolStatus::Error);

        let mut args = valid_chart_args("pie");
        args.as_object_mut().unwrap().remove("data");
        assert_eq!(
            RenderChartArgs::from_value(&args),
            Err(ToolArgsError::MissingField("data"))
        );
        let response = rec.gateway.dispatch(&call(RENDER_CHART, args));
        assert_eq!(response.status, ToolStatus::Error);
        assert!(response.result["error"].as_str().unwrap().contains("data"));

        assert_eq!(
            RenderChartArgs::from_value(&json!({"series": [], "data": []})),
            Err(ToolArgsError::MissingField("type"))
        );
        assert!(matches!(
            RenderChartArgs::from_value(&json!("pas un objet")),
            Err(ToolArgsError::Malformed(_))
        ));
        assert!(rec.charts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_navigate_with_and_without_view() {
        let rec = recorder();

        let with_view = rec.gateway.dispatch(&call(NAVIGATE_APP, json!({"view_id": "forecast"})));
        let without_view = rec.gateway.dispatch(&call(NAVIGATE_APP, json!({})));
        let null_args = rec.gateway.dispatch(&call(NAVIGATE_APP, Value::Null));

        assert_eq!(with_view.status, ToolStatus::Success);
        assert_eq!(without_view.status, ToolStatus::Success);
        assert_eq!(null_args.status, ToolStatus::Success);
        assert_eq!(*rec.views.lock().unwrap(), vec!["forecast".to_string()]);
    }

    #[test]
    fn test_unknown_tool_is_acknowledged() {
        let rec = recorder();
        let response = rec.gateway.dispatch(&call("play_music", json!({})));

        assert_eq!(response.status, ToolStatus::Ok);
        assert!(rec.charts.lock().unwrap().is_empty());
        assert!(rec.views.lock().unwrap().is_empty());
    }

    #[test]
    fn test_batch_preserves_order() {
        let rec = recorder();
        let requests = vec![
            call(NAVIGATE_APP, json!({"view_id": "a"})),
            call(RENDER_CHART, json!({})),
            call("other", Value::Null),
        ];

        let responses = rec.gateway.dispatch_batch(&requests);
        let statuses: Vec<ToolStatus> = responses.iter().map(|r| r.status).collect();
        let ids: Vec<&str> = responses.iter().map(|r| r.id.as_str()).collect();

        assert_eq!(statuses, vec![ToolStatus::Success, ToolStatus::Error, ToolStatus::Ok]);
        assert_eq!(ids, vec!["navigate_app-id", "render_chart-id", "other-id"]);
    }

    #[test]
    fn test_function_response_payload() {
        let response = ToolCallResponse {
            id: "x".into(),
            name: NAVIGATE_APP.into(),
            status: ToolStatus::Success,
            result: json!({"viewId": "a"}),
        };

        let wire: FunctionResponse = response.into();
        assert_eq!(wire.response["status"], "success");
        assert_eq!(wire.response["result"]["viewId"], "a");
    }

    #[test]
    fn test_catalog() {
        let names: Vec<String> = default_catalog().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec![RENDER_CHART, NAVIGATE_APP]);
        assert_eq!(render_chart_declaration().parameters["properties"]["type"]["enum"][5], "composed");
    }
}
