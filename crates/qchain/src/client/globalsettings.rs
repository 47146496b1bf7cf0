use crate::client::output::outputs::Output;

pub struct GlobalSettings {
    printer: Box<dyn Output>,
}

impl GlobalSettings {
    pub fn new(printer: Box<dyn Output>) -> Self {
        GlobalSettings { printer }
    }

    pub fn printer(&self) -> &dyn Output {
        self.printer.as_ref()
    }
}
