// Catppuccin Mocha color palette

pub mod catppuccin {
    pub const BASE: (u8, u8, u8) = (30, 30, 46); // #1e1e2e
    pub const TEXT: (u8, u8, u8) = (205, 214, 244); // #cdd6f4
    pub const SURFACE0: (u8, u8, u8) = (49, 50, 68); // #313244
    pub const SURFACE1: (u8, u8, u8) = (69, 71, 90); // #45475a
    pub const BLUE: (u8, u8, u8) = (137, 180, 250); // #89b4fa
    pub const GREEN: (u8, u8, u8) = (166, 227, 161); // #a6e3a1
    pub const PEACH: (u8, u8, u8) = (250, 179, 135); // #fab387
    pub const MAUVE: (u8, u8, u8) = (203, 166, 247); // #cba6f7
}

pub mod plotters_colors {
    use super::catppuccin;
    use plotters::style::RGBColor;

    const fn rgb(color: (u8, u8, u8)) -> RGBColor {
        RGBColor(color.0, color.1, color.2)
    }

    pub const BASE: RGBColor = rgb(catppuccin::BASE);
    pub const TEXT: RGBColor = rgb(catppuccin::TEXT);
    pub const SURFACE0: RGBColor = rgb(catppuccin::SURFACE0);
    pub const SURFACE1: RGBColor = rgb(catppuccin::SURFACE1);
    pub const BLUE: RGBColor = rgb(catppuccin::BLUE);
    pub const GREEN: RGBColor = rgb(catppuccin::GREEN);
    pub const PEACH: RGBColor = rgb(catppuccin::PEACH);
    pub const MAUVE: RGBColor = rgb(catppuccin::MAUVE);
}
