//! Element handlers: selector-driven discovery that mints registry
//! handles, plus lookup of already-registered elements.

use macos_use_core::convert::rect_to_proto;
use macos_use_core::element_registry::ElementRegistry;
use macos_use_core::element_registry::new_element;
use macos_use_core::error::AutomationError;
use macos_use_core::error::Result;
use macos_use_core::error::reason;
use macos_use_core::resource_name::parse_application_scope;
use macos_use_core::resource_name::parse_element_name;
use macos_use_core::selector::parse_selector;

use macos_use_proto::macosusesdk::v1::Element;
use macos_use_proto::macosusesdk::v1::FindElementsRequest;
use macos_use_proto::macosusesdk::v1::FindElementsResponse;
use macos_use_proto::macosusesdk::v1::GetElementRequest;

use super::AutomationService;

const DEFAULT_MAX_RESULTS: usize = 50;

impl AutomationService {
    pub(crate) async fn handle_find_elements(
        &self,
        request: FindElementsRequest,
    ) -> Result<FindElementsResponse> {
        let scope = parse_application_scope(&request.parent)?;
        let query = parse_selector(&request.selector)?;
        let max_results = if request.max_results <= 0 {
            DEFAULT_MAX_RESULTS
        } else {
            request.max_results as usize
        };

        let found = self
            .system
            .query_elements(scope.pid(), &query, max_results)
            .await?;

        let mut elements = Vec::with_capacity(found.len());
        for item in found {
            let element_id = ElementRegistry::generate_id();
            let pid = scope.pid().unwrap_or_default();
            let mut element = new_element(pid, &element_id);
            element.role = item.role;
            element.title = item.title;
            element.bounds = item.bounds.map(rect_to_proto);
            element.attributes = item.attributes;
            self.elements.register(element.clone(), Some(item.token)).await;
            elements.push(element);
        }
        Ok(FindElementsResponse { elements })
    }

    pub(crate) async fn handle_get_element(&self, request: GetElementRequest) -> Result<Element> {
        let parsed = parse_element_name(&request.name)?;
        let element = self.elements.get(&parsed.id).await?;
        if element.pid != parsed.pid {
            return Err(AutomationError::not_found(
                reason::ELEMENT_NOT_FOUND,
                "element",
                request.name,
            ));
        }
        Ok(element)
    }
}
