//! Decoder for Android's compiled ("binary") XML, enough to read the start
//! elements of `AndroidManifest.xml` together with their attributes.

use super::res::{
    child_chunks, u16_at, u32_at, u8_at, ChunkHeader, ResValue, Result, StringPool,
    RES_STRING_POOL_TYPE, RES_XML_RESOURCE_MAP_TYPE, RES_XML_START_ELEMENT_TYPE, RES_XML_TYPE,
};

#[derive(Debug, Clone)]
pub(crate) struct XmlAttribute {
    pub name: String,
    /// Android framework attribute id, if the resource map names one.
    pub resource_id: Option<u32>,
    pub value: ResValue,
}

#[derive(Debug, Clone)]
pub(crate) struct XmlElement {
    pub name: String,
    pub attributes: Vec<XmlAttribute>,
}

impl XmlElement {
    /// Look an attribute up by framework id, falling back to its name for
    /// documents without a resource map.
    pub fn attribute(&self, resource_id: Option<u32>, name: &str) -> Option<&ResValue> {
        resource_id
            .and_then(|id| self.attributes.iter().find(|a| a.resource_id == Some(id)))
            .or_else(|| self.attributes.iter().find(|a| a.name == name))
            .map(|a| &a.value)
    }
}

/// Every start element of the document, in document order.
pub(crate) fn start_elements(data: &[u8]) -> Result<Vec<XmlElement>> {
    let root = ChunkHeader::read(data, 0)?.expect(RES_XML_TYPE)?;

    let mut pool = StringPool::default();
    let mut resource_map: Vec<u32> = Vec::new();
    let mut elements = Vec::new();

    for chunk in child_chunks(data, root.body_start(), root.end())? {
        match chunk.kind {
            RES_STRING_POOL_TYPE => pool = StringPool::parse(data, chunk)?,
            RES_XML_RESOURCE_MAP_TYPE => {
                resource_map = (chunk.body_start()..chunk.end())
                    .step_by(4)
                    .map(|off| u32_at(data, off))
                    .collect::<Result<_>>()?;
            }
            RES_XML_START_ELEMENT_TYPE => {
                elements.push(read_start_element(data, chunk, &pool, &resource_map)?);
            }
            _ => {}
        }
    }

    Ok(elements)
}

fn read_start_element(
    data: &[u8],
    chunk: ChunkHeader,
    pool: &StringPool,
    resource_map: &[u32],
) -> Result<XmlElement> {
    // ResXMLTree_attrExt follows the node header
    let ext = chunk.body_start();
    let name = u32_at(data, ext + 4)?;
    let attribute_start = u16_at(data, ext + 8)? as usize;
    let attribute_size = u16_at(data, ext + 10)? as usize;
    let attribute_count = u16_at(data, ext + 12)? as usize;

    let mut attributes = Vec::with_capacity(attribute_count);
    for i in 0..attribute_count {
        let at = ext + attribute_start + i * attribute_size;
        let attr_name = u32_at(data, at + 4)?;
        let raw_value = u32_at(data, at + 8)?;
        let data_type = u8_at(data, at + 15)?;
        let value_data = u32_at(data, at + 16)?;

        let mut value = ResValue::decode(data_type, value_data, pool);
        if let ResValue::Other { .. } = value {
            if let Some(raw) = pool.get(raw_value) {
                value = ResValue::String(raw.to_string());
            }
        }

        attributes.push(XmlAttribute {
            name: pool.get(attr_name).unwrap_or_default().to_string(),
            resource_id: resource_map.get(attr_name as usize).copied(),
            value,
        });
    }

    Ok(XmlElement {
        name: pool.get(name).unwrap_or_default().to_string(),
        attributes,
    })
}
