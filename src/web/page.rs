//! HTML for the single-page demo.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::report::{ResultsTable, BOXES_COLUMN, CONFIDENCE_COLUMN, NO_DETECTIONS_MESSAGE};

const TITLE: &str = "WELCOME TO GLOBAL WHEAT HEAD CHALLENGE!";
const SUBTITLE: &str = "Please open this website with Google Chrome.";
const UPLOAD_CAPTION: &str = "Uploaded Image";

const STYLE: &str = "body{font-family:sans-serif;max-width:960px;margin:2em auto;padding:0 1em}\
img{max-width:100%;height:auto}\
figure{margin:0 0 1em}figcaption{color:#555;text-align:center}\
table{border-collapse:collapse}td,th{border:1px solid #ccc;padding:4px 10px;text-align:left}\
.error{color:#b00}";

fn layout(body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Wheat Head Detector</title>\
<style>{STYLE}</style></head><body>\n<h1>{TITLE}</h1>\n<h3>{SUBTITLE}</h3>\n{body}\n</body></html>\n"
    )
}

fn upload_form(default_threshold: f32) -> String {
    format!(
        "<form method=\"post\" action=\"/detect\" enctype=\"multipart/form-data\">\n\
<p><label>Choose an image... (jpg only) <input type=\"file\" name=\"image\" accept=\".jpg,.jpeg,image/jpeg\" required></label></p>\n\
<p><label>Please specify the confidence of a wheat head \
<input type=\"number\" name=\"confidence\" min=\"0\" max=\"1\" step=\"0.01\" placeholder=\"{default_threshold}\"></label></p>\n\
<p><button type=\"submit\">Confirm</button></p>\n</form>"
    )
}

pub fn index_page(default_threshold: f32) -> String {
    layout(&upload_form(default_threshold))
}

pub fn error_page(message: &str, default_threshold: f32) -> String {
    layout(&format!(
        "<p class=\"error\">{}</p>\n{}",
        escape_html(message),
        upload_form(default_threshold)
    ))
}

/// Result page: the upload as received, then the annotated image and table
/// (or the no-detection message).
pub fn result_page(
    uploaded_jpeg: &[u8],
    annotated_png: &[u8],
    table: &ResultsTable,
    threshold: f32,
    default_threshold: f32,
) -> String {
    let mut body = String::new();
    body.push_str(&format!(
        "<figure><img alt=\"{caption}\" src=\"data:image/jpeg;base64,{data}\">\
<figcaption>{caption}</figcaption></figure>\n",
        caption = UPLOAD_CAPTION,
        data = STANDARD.encode(uploaded_jpeg)
    ));
    body.push_str(&format!(
        "<p><img alt=\"Detections\" src=\"data:image/png;base64,{}\"></p>\n",
        STANDARD.encode(annotated_png)
    ));
    if table.is_empty() {
        body.push_str(&format!("<p>{}</p>\n", escape_html(NO_DETECTIONS_MESSAGE)));
    } else {
        body.push_str(&format!(
            "<h2>Results</h2>\n<p>{} detections at confidence &ge; {}</p>\n",
            table.len(),
            threshold
        ));
        body.push_str(&format!(
            "<table>\n<tr><th>{}</th><th>{}</th></tr>\n",
            BOXES_COLUMN, CONFIDENCE_COLUMN
        ));
        for row in table.rows() {
            body.push_str(&format!(
                "<tr><td>{}</td><td>{:.6}</td></tr>\n",
                escape_html(&row.detected_boxes),
                row.confidence
            ));
        }
        body.push_str("</table>\n");
    }
    body.push_str(&upload_form(default_threshold));
    layout(&body)
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
