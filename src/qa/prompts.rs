//! Prompt templates. Pure functions: same inputs, same prompt.

use crate::docs::types::RetrievedChunk;
use crate::qa::extract::{Record, TEST_CASE_FIELDS};

const NO_CONTEXT: &str = "(no reference documents matched this request)";

/// The line every generated script must contain verbatim.
pub fn reference_literal(reference_path: &str) -> String {
    format!("html_file_path = \"{}\"", reference_path)
}

pub fn build_test_case_prompt(chunks: &[RetrievedChunk], query: &str) -> String {
    let mut context = String::new();
    for chunk in chunks {
        context.push_str(&format!("[{}]\n{}\n\n", chunk.source, chunk.text));
    }
    if context.is_empty() {
        context.push_str(NO_CONTEXT);
        context.push('\n');
    }

    let fields = TEST_CASE_FIELDS
        .iter()
        .map(|f| format!("\"{}\"", f))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You are a senior QA engineer. Use ONLY the context below to generate STRICT JSON test cases.\n\
         \n\
         CONTEXT:\n\
         {context}\n\
         USER REQUEST:\n\
         {query}\n\
         \n\
         REQUIREMENTS:\n\
         - Output MUST be ONLY valid JSON.\n\
         - The JSON must be a list of objects: [ {{...}}, {{...}} ]\n\
         - Use double quotes for keys and string values.\n\
         - NO backticks, NO code fences, NO explanations, NO commentary.\n\
         - Each test case must contain exactly these fields:\n  {fields}\n\
         - \"Grounded_In\" names the context source(s) the test case is based on.\n\
         - Do not invent behaviour that the context does not describe.\n\
         \n\
         RETURN ONLY THE JSON (do not wrap it in markdown or code fences):\n"
    )
}

pub fn build_script_prompt(test_case: &Record, markup: &str, reference_path: &str) -> String {
    let test_case_json = serde_json::to_string_pretty(test_case)
        .unwrap_or_else(|_| serde_json::Value::Object(test_case.clone()).to_string());
    let literal = reference_literal(reference_path);

    format!(
        "You are a Python Selenium automation engineer.\n\
         \n\
         Generate a complete Python Selenium test script for this test case:\n\
         {test_case_json}\n\
         \n\
         The HTML file is located at this exact path:\n\
         {reference_path}\n\
         \n\
         Insert this EXACT line in the script:\n\
         {literal}\n\
         \n\
         HTML content for selectors:\n\
         {markup}\n\
         \n\
         STRICT RULES:\n\
         - Use Selenium with webdriver.Chrome().\n\
         - Use WebDriverWait for all interactions.\n\
         - Use ONLY selectors (ids, names, classes) that exist in the HTML above.\n\
         - DO NOT invent selectors.\n\
         - The script MUST have this structure:\n\
         \n\
         from selenium import webdriver\n\
         from selenium.webdriver.common.by import By\n\
         from selenium.webdriver.support.ui import WebDriverWait\n\
         from selenium.webdriver.support import expected_conditions as EC\n\
         \n\
         {literal}\n\
         \n\
         driver = webdriver.Chrome()\n\
         driver.get(html_file_path)\n\
         wait = WebDriverWait(driver, 10)\n\
         \n\
         try:\n\
         \x20   # steps...\n\
         \x20   print(\"TEST PASSED: <reason>\")\n\
         except Exception as e:\n\
         \x20   print(\"TEST FAILED:\", e)\n\
         finally:\n\
         \x20   print(\"Test completed.\")\n\
         \x20   driver.quit()\n\
         \n\
         - DO NOT wrap the code in backticks.\n\
         - RETURN ONLY RAW PYTHON CODE.\n"
    )
}
